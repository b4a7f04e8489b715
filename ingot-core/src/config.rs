//! Generation config
//!
//! The key/value map handed to the code generator. Assembled once from the
//! parsed connection descriptor plus the caller's options, then treated as
//! immutable: the generator receives it serialized as a single JSON object.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::conninfo::ConnInfo;
use crate::options::GenerateOptions;
use crate::MIGRATIONS_TABLE;

/// A single config value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<String>),
}

/// The configuration map passed to the generator
///
/// Keys are kept in sorted order so two runs over the same schema produce
/// byte-identical JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct GenConfig {
    values: BTreeMap<String, ConfigValue>,
}

impl GenConfig {
    /// Builds the connection half of the config from a parsed descriptor.
    ///
    /// Always deny-lists the migration bookkeeping table so the generator
    /// never emits code for it.
    pub fn from_conn_info(info: &ConnInfo) -> Self {
        let mut values = BTreeMap::new();

        values.insert("host".to_string(), ConfigValue::String(info.host.clone()));
        values.insert("port".to_string(), ConfigValue::Int(i64::from(info.port)));
        if let Some(dbname) = &info.dbname {
            values.insert("dbname".to_string(), ConfigValue::String(dbname.clone()));
        }
        if let Some(user) = &info.user {
            values.insert("user".to_string(), ConfigValue::String(user.clone()));
        }
        if let Some(password) = &info.password {
            values.insert(
                "password".to_string(),
                ConfigValue::String(password.clone()),
            );
        }
        for (key, value) in &info.extra {
            values.insert(key.clone(), ConfigValue::String(value.clone()));
        }

        values.insert(
            "blacklist".to_string(),
            ConfigValue::List(vec![MIGRATIONS_TABLE.to_string()]),
        );

        Self { values }
    }

    /// Merges the caller-supplied generation options in verbatim
    pub fn apply_options(&mut self, options: &GenerateOptions) {
        self.values.insert(
            "output".to_string(),
            ConfigValue::String(options.output_dir.display().to_string()),
        );
        self.values.insert(
            "pkgname".to_string(),
            ConfigValue::String(options.pkgname.clone()),
        );
        self.values
            .insert("tags".to_string(), ConfigValue::List(options.tags.clone()));
        self.values
            .insert("no-tests".to_string(), ConfigValue::Bool(options.no_tests));
        self.values
            .insert("no-hooks".to_string(), ConfigValue::Bool(options.no_hooks));
        self.values.insert(
            "add-soft-deletes".to_string(),
            ConfigValue::Bool(options.add_soft_deletes),
        );
    }

    /// Looks up a config value by key
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info() -> ConnInfo {
        ConnInfo::parse("host=127.0.0.1 port=5433 dbname=postgres user=postgres sslmode=disable")
            .unwrap()
    }

    #[test]
    fn test_port_is_numeric() {
        let config = GenConfig::from_conn_info(&sample_info());
        assert_eq!(config.get("port"), Some(&ConfigValue::Int(5433)));
    }

    #[test]
    fn test_blacklist_always_present() {
        let config = GenConfig::from_conn_info(&sample_info());
        assert_eq!(
            config.get("blacklist"),
            Some(&ConfigValue::List(vec![MIGRATIONS_TABLE.to_string()]))
        );
    }

    #[test]
    fn test_options_merge_verbatim() {
        let mut config = GenConfig::from_conn_info(&sample_info());
        let mut options = GenerateOptions::default();
        options.pkgname = "schema".to_string();
        options.tags = vec!["json".to_string(), "yaml".to_string()];
        options.no_tests = true;

        config.apply_options(&options);

        assert_eq!(
            config.get("pkgname"),
            Some(&ConfigValue::String("schema".to_string()))
        );
        assert_eq!(
            config.get("tags"),
            Some(&ConfigValue::List(vec![
                "json".to_string(),
                "yaml".to_string()
            ]))
        );
        assert_eq!(config.get("no-tests"), Some(&ConfigValue::Bool(true)));
        assert_eq!(config.get("no-hooks"), Some(&ConfigValue::Bool(false)));
    }

    #[test]
    fn test_json_shape() {
        let mut config = GenConfig::from_conn_info(&sample_info());
        config.apply_options(&GenerateOptions::default());

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["host"], "127.0.0.1");
        assert_eq!(json["port"], 5433);
        assert_eq!(json["blacklist"][0], MIGRATIONS_TABLE);
        assert_eq!(json["no-tests"], false);
    }

    #[test]
    fn test_deterministic_serialization() {
        let mut a = GenConfig::from_conn_info(&sample_info());
        a.apply_options(&GenerateOptions::default());
        let mut b = GenConfig::from_conn_info(&sample_info());
        b.apply_options(&GenerateOptions::default());

        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
