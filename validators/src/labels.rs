use std::collections::HashMap;

use tracing::warn;

use api::Validator;
use common::config::ValidatorSpec;

pub const LABEL_PUBKEY: &str = "pubkey";
pub const LABEL_WITHDRAWAL_CREDENTIALS: &str = "withdrawal_credentials";
pub const LABEL_STATUS: &str = "status";

const LABEL_DEFAULT_VALUE: &str = "";

const BUILTIN_LABELS: [&str; 3] = [LABEL_PUBKEY, LABEL_WITHDRAWAL_CREDENTIALS, LABEL_STATUS];

/// Ordered label name set shared by every gauge family.
///
/// Built-in names occupy the first positions in a fixed order; custom
/// names found on the configured validators are appended in the order
/// they are first seen during a left-to-right scan. Positions never
/// change once the schema is built.
#[derive(Debug, Clone)]
pub struct LabelSchema {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelSchema {
    pub fn discover(specs: &[ValidatorSpec]) -> Self {
        let mut schema = Self {
            names: Vec::new(),
            index: HashMap::new(),
        };

        for builtin in BUILTIN_LABELS {
            schema.insert(builtin);
        }

        for spec in specs {
            for name in spec.labels.keys() {
                schema.insert(name);
            }
        }

        schema
    }

    fn insert(&mut self, name: &str) {
        if !self.index.contains_key(name) {
            self.index.insert(name.to_string(), self.names.len());
            self.names.push(name.to_string());
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

/// Resolve the label vector for one snapshot, aligned to the schema.
///
/// Per position: a non-empty override from the validator's config wins,
/// then the built-in value derived from the snapshot, then the empty
/// default.
pub fn label_values(schema: &LabelSchema, snapshot: &Validator, spec: &ValidatorSpec) -> Vec<String> {
    schema
        .names()
        .iter()
        .map(|name| {
            if let Some(value) = spec.labels.get(name) {
                if !value.is_empty() {
                    return value.clone();
                }
            }

            match name.as_str() {
                LABEL_PUBKEY => snapshot.pubkey.clone(),
                LABEL_STATUS => snapshot.status.clone(),
                LABEL_WITHDRAWAL_CREDENTIALS => match snapshot.withdrawal_credentials.get(..4) {
                    Some(prefix) => prefix.to_string(),
                    None => {
                        warn!(
                            pubkey = %snapshot.pubkey,
                            credentials = %snapshot.withdrawal_credentials,
                            "Withdrawal credentials shorter than 4 characters"
                        );
                        LABEL_DEFAULT_VALUE.to_string()
                    }
                },
                _ => LABEL_DEFAULT_VALUE.to_string(),
            }
        })
        .collect()
}
