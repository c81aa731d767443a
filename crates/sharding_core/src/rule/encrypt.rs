//! Column encryption rule and built-in encryptors.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use sharding_error::{Result, ResultExt, ShardingError};

use crate::config::rule::EncryptRuleConfig;
use crate::registry::ExtensionRegistry;
use crate::value::ScalarValue;

pub trait Encryptor: fmt::Debug + Sync + Send {
    fn encryptor_type(&self) -> &'static str;

    fn encrypt(&self, plain: &ScalarValue) -> Result<ScalarValue>;

    fn decrypt(&self, cipher: &ScalarValue) -> Result<ScalarValue>;
}

/// One-way md5 hex digest. Decrypt returns the digest as is.
#[derive(Debug, Default)]
pub struct Md5Encryptor;

impl Md5Encryptor {
    pub const TYPE: &'static str = "MD5";
}

impl Encryptor for Md5Encryptor {
    fn encryptor_type(&self) -> &'static str {
        Self::TYPE
    }

    fn encrypt(&self, plain: &ScalarValue) -> Result<ScalarValue> {
        if plain.is_null() {
            return Ok(ScalarValue::Null);
        }
        Ok(ScalarValue::Utf8(format!("{:x}", md5::compute(plain.to_string()))))
    }

    fn decrypt(&self, cipher: &ScalarValue) -> Result<ScalarValue> {
        Ok(cipher.clone())
    }
}

/// RC4 stream cipher with base64 encoded output.
pub struct Rc4Encryptor {
    key: Vec<u8>,
}

impl Rc4Encryptor {
    pub const TYPE: &'static str = "RC4";

    const MIN_KEY_LEN: usize = 5;
    const MAX_KEY_LEN: usize = 255;

    pub fn try_new(props: &BTreeMap<String, String>) -> Result<Self> {
        let key = props
            .get("rc4-key-value")
            .ok_or_else(|| ShardingError::config("Missing required property 'rc4-key-value'"))?;
        let key = key.as_bytes().to_vec();
        if key.len() < Self::MIN_KEY_LEN || key.len() > Self::MAX_KEY_LEN {
            return Err(ShardingError::config("RC4 key length must be between 5 and 255 bytes")
                .with_field("length", key.len()));
        }
        Ok(Rc4Encryptor { key })
    }

    fn apply_keystream(&self, data: &[u8]) -> Vec<u8> {
        let mut s: [u8; 256] = std::array::from_fn(|i| i as u8);
        let mut j: u8 = 0;
        for i in 0..256 {
            j = j.wrapping_add(s[i]).wrapping_add(self.key[i % self.key.len()]);
            s.swap(i, j as usize);
        }

        let mut i: u8 = 0;
        let mut j: u8 = 0;
        data.iter()
            .map(|byte| {
                i = i.wrapping_add(1);
                j = j.wrapping_add(s[i as usize]);
                s.swap(i as usize, j as usize);
                let k = s[s[i as usize].wrapping_add(s[j as usize]) as usize];
                byte ^ k
            })
            .collect()
    }
}

impl fmt::Debug for Rc4Encryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rc4Encryptor").finish_non_exhaustive()
    }
}

impl Encryptor for Rc4Encryptor {
    fn encryptor_type(&self) -> &'static str {
        Self::TYPE
    }

    fn encrypt(&self, plain: &ScalarValue) -> Result<ScalarValue> {
        if plain.is_null() {
            return Ok(ScalarValue::Null);
        }
        let cipher = self.apply_keystream(plain.to_string().as_bytes());
        Ok(ScalarValue::Utf8(BASE64_STANDARD.encode(cipher)))
    }

    fn decrypt(&self, cipher: &ScalarValue) -> Result<ScalarValue> {
        let encoded = match cipher {
            ScalarValue::Null => return Ok(ScalarValue::Null),
            ScalarValue::Utf8(s) => s,
            other => {
                return Err(ShardingError::new("RC4 cipher value must be a string").with_field("value", other));
            }
        };
        let bytes = BASE64_STANDARD
            .decode(encoded)
            .context("Failed to decode RC4 cipher text")?;
        let plain = String::from_utf8(self.apply_keystream(&bytes)).context("RC4 plain text is not utf8")?;
        Ok(ScalarValue::Utf8(plain))
    }
}

/// Encryption settings for one logic column.
#[derive(Debug, Clone)]
pub struct EncryptColumn {
    pub logic_column: String,
    pub cipher_column: String,
    pub assisted_query_column: Option<String>,
    pub plain_column: Option<String>,
    pub encryptor: Arc<dyn Encryptor>,
    pub assisted_query_encryptor: Option<Arc<dyn Encryptor>>,
}

impl EncryptColumn {
    /// Value written to the assisted query column, if there is one.
    pub fn assisted_query_value(&self, plain: &ScalarValue) -> Result<Option<ScalarValue>> {
        match (&self.assisted_query_column, &self.assisted_query_encryptor) {
            (Some(_), Some(encryptor)) => Ok(Some(encryptor.encrypt(plain)?)),
            (Some(_), None) => Ok(Some(self.encryptor.encrypt(plain)?)),
            (None, _) => Ok(None),
        }
    }

    /// Column used in predicates. The assisted query column when configured
    /// since it holds a deterministic digest.
    pub fn query_column(&self) -> &str {
        self.assisted_query_column.as_deref().unwrap_or(&self.cipher_column)
    }

    /// Value to compare against `query_column`.
    pub fn query_value(&self, plain: &ScalarValue) -> Result<ScalarValue> {
        match self.assisted_query_value(plain)? {
            Some(v) => Ok(v),
            None => self.encryptor.encrypt(plain),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EncryptRule {
    /// Lower cased logic table name -> columns.
    tables: HashMap<String, Vec<EncryptColumn>>,
}

impl EncryptRule {
    pub fn try_from_config(config: &EncryptRuleConfig, registry: &ExtensionRegistry) -> Result<Self> {
        let mut encryptors: HashMap<&str, Arc<dyn Encryptor>> = HashMap::new();
        for (name, algorithm) in &config.encryptors {
            encryptors.insert(name, registry.create_encryptor(algorithm)?);
        }
        let lookup = |name: &str| {
            encryptors.get(name).cloned().ok_or_else(|| {
                ShardingError::config("Missing encryptor").with_field("encryptor", name.to_string())
            })
        };

        let mut tables = HashMap::new();
        for table in &config.tables {
            let mut columns = Vec::with_capacity(table.columns.len());
            for column in &table.columns {
                columns.push(EncryptColumn {
                    logic_column: column.logic_column.clone(),
                    cipher_column: column.cipher_column.clone(),
                    assisted_query_column: column.assisted_query_column.clone(),
                    plain_column: column.plain_column.clone(),
                    encryptor: lookup(&column.encryptor_name)?,
                    assisted_query_encryptor: match &column.assisted_query_encryptor_name {
                        Some(name) => Some(lookup(name)?),
                        None => None,
                    },
                });
            }
            tables.insert(table.table.to_lowercase(), columns);
        }

        Ok(EncryptRule { tables })
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn find_table(&self, logic_table: &str) -> Option<&[EncryptColumn]> {
        self.tables.get(&logic_table.to_lowercase()).map(|c| c.as_slice())
    }

    pub fn find_column(&self, logic_table: &str, logic_column: &str) -> Option<&EncryptColumn> {
        self.find_table(logic_table)?
            .iter()
            .find(|c| c.logic_column.eq_ignore_ascii_case(logic_column))
    }

    /// Find the column whose cipher column has the given name.
    pub fn find_by_cipher_column(&self, logic_table: &str, cipher_column: &str) -> Option<&EncryptColumn> {
        self.find_table(logic_table)?
            .iter()
            .find(|c| c.cipher_column.eq_ignore_ascii_case(cipher_column))
    }
}
