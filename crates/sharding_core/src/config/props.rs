use std::collections::HashMap;
use std::sync::LazyLock;

use sharding_error::{Result, ShardingError};

/// Default number of connections a single logical query may hold per data
/// source.
pub const DEFAULT_MAX_CONNECTIONS_SIZE_PER_QUERY: u64 = 1;

/// Kernel properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigProps {
    /// Log logical and actual SQL after rewrite.
    pub sql_show: bool,
    /// Only log the data sources hit and unit count instead of every actual
    /// SQL.
    pub sql_simple: bool,
    pub max_connections_size_per_query: u64,
}

impl Default for ConfigProps {
    fn default() -> Self {
        ConfigProps {
            sql_show: false,
            sql_simple: false,
            max_connections_size_per_query: DEFAULT_MAX_CONNECTIONS_SIZE_PER_QUERY,
        }
    }
}

impl ConfigProps {
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let func = setting_functions(name)?;
        (func.set)(value, self)
    }

    pub fn get(&self, name: &str) -> Result<String> {
        let func = setting_functions(name)?;
        Ok((func.get)(self))
    }

    pub fn reset(&mut self, name: &str) -> Result<()> {
        let func = setting_functions(name)?;
        let def_conf = Self::default();
        let val = (func.get)(&def_conf);
        (func.set)(&val, self)
    }

    /// Build props from key/value pairs, e.g. from an embedding
    /// application's configuration.
    pub fn try_from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut props = Self::default();
        for (name, value) in pairs {
            props.set(name, value)?;
        }
        Ok(props)
    }

    /// Names and descriptions of every setting.
    pub fn descriptions() -> impl Iterator<Item = (&'static str, &'static str)> {
        let mut settings: Vec<_> = GET_SET_FUNCTIONS
            .iter()
            .map(|(name, func)| (*name, func.description))
            .collect();
        settings.sort_unstable();
        settings.into_iter()
    }
}

fn setting_functions(name: &str) -> Result<&'static SettingFunctions> {
    GET_SET_FUNCTIONS
        .get(name)
        .ok_or_else(|| ShardingError::config(format!("Missing setting for '{name}'")))
}

struct SettingFunctions {
    description: &'static str,
    set: fn(value: &str, conf: &mut ConfigProps) -> Result<()>,
    get: fn(conf: &ConfigProps) -> String,
}

impl SettingFunctions {
    const fn new<S: KernelSetting>() -> Self {
        SettingFunctions {
            description: S::DESCRIPTION,
            set: S::set_from_str as _,
            get: S::get_as_string as _,
        }
    }
}

fn insert_setting<S: KernelSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<SqlShow>(&mut map);
    insert_setting::<SqlSimple>(&mut map);
    insert_setting::<MaxConnectionsSizePerQuery>(&mut map);

    map
});

pub trait KernelSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_str(value: &str, conf: &mut ConfigProps) -> Result<()>;
    fn get_as_string(conf: &ConfigProps) -> String;
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "1" => Ok(true),
        "false" | "off" | "0" => Ok(false),
        _ => Err(ShardingError::config("Invalid boolean setting value")
            .with_field("setting", name.to_string())
            .with_field("value", value.to_string())),
    }
}

pub struct SqlShow;

impl KernelSetting for SqlShow {
    const NAME: &'static str = "sql_show";
    const DESCRIPTION: &'static str = "Log the logical SQL and every rewritten actual SQL";

    fn set_from_str(value: &str, conf: &mut ConfigProps) -> Result<()> {
        conf.sql_show = parse_bool(Self::NAME, value)?;
        Ok(())
    }

    fn get_as_string(conf: &ConfigProps) -> String {
        conf.sql_show.to_string()
    }
}

pub struct SqlSimple;

impl KernelSetting for SqlSimple {
    const NAME: &'static str = "sql_simple";
    const DESCRIPTION: &'static str = "Log a summary of actual SQL instead of every statement";

    fn set_from_str(value: &str, conf: &mut ConfigProps) -> Result<()> {
        conf.sql_simple = parse_bool(Self::NAME, value)?;
        Ok(())
    }

    fn get_as_string(conf: &ConfigProps) -> String {
        conf.sql_simple.to_string()
    }
}

pub struct MaxConnectionsSizePerQuery;

impl KernelSetting for MaxConnectionsSizePerQuery {
    const NAME: &'static str = "max_connections_size_per_query";
    const DESCRIPTION: &'static str =
        "Max number of connections one logical query may open against a single data source";

    fn set_from_str(value: &str, conf: &mut ConfigProps) -> Result<()> {
        let val: u64 = value.trim().parse()?;
        if val == 0 {
            return Err(
                ShardingError::config("Setting must be greater than zero").with_field("setting", Self::NAME)
            );
        }
        conf.max_connections_size_per_query = val;
        Ok(())
    }

    fn get_as_string(conf: &ConfigProps) -> String {
        conf.max_connections_size_per_query.to_string()
    }
}

#[cfg(test)]
mod tests {
    use sharding_error::ErrorKind;

    use super::*;

    #[test]
    fn set_and_get() {
        let mut props = ConfigProps::default();
        props.set("sql_show", "true").unwrap();
        props.set("max_connections_size_per_query", "8").unwrap();

        assert!(props.sql_show);
        assert_eq!("8", props.get("max_connections_size_per_query").unwrap());
    }

    #[test]
    fn reset_restores_default() {
        let mut props = ConfigProps::try_from_pairs([("sql_simple", "on")]).unwrap();
        assert!(props.sql_simple);
        props.reset("sql_simple").unwrap();
        assert!(!props.sql_simple);
    }

    #[test]
    fn unknown_setting() {
        let err = ConfigProps::default().get("executor_size").unwrap_err();
        assert_eq!(ErrorKind::Config, err.kind());
    }

    #[test]
    fn zero_connections_rejected() {
        let mut props = ConfigProps::default();
        let err = props.set("max_connections_size_per_query", "0").unwrap_err();
        assert_eq!(ErrorKind::Config, err.kind());
        assert_eq!(1, props.max_connections_size_per_query);
    }

    #[test]
    fn descriptions_sorted() {
        let names: Vec<_> = ConfigProps::descriptions().map(|(name, _)| name).collect();
        assert_eq!(vec!["max_connections_size_per_query", "sql_show", "sql_simple"], names);
    }
}
