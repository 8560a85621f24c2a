// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the modbus-acquisition project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use modbus_acquisition::config::{self, Config};

#[test]
fn test_config_schema_output() -> Result<()> {
    // The schema goes to stdout, this only checks that it is printable
    config::output_config_schema()?;
    Ok(())
}

#[test]
fn test_default_config_matches_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(include_str!("../resources/config.schema.json"))?;
    let validator = jsonschema::draft202012::options()
        .build(&schema)
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let instance = serde_json::to_value(Config::default())?;
    assert!(validator.is_valid(&instance));

    // Every section appears in the schema
    let properties = schema["properties"].as_object().unwrap();
    for section in ["serial", "modbus", "output", "filter"] {
        assert!(properties.contains_key(section), "missing {}", section);
        assert!(instance.get(section).is_some());
    }
    Ok(())
}
