use prometheus::{GaugeVec, Opts, Registry};
use tracing::warn;

use api::Validator;

/// Gauge families keyed by the shared label schema.
///
/// Values are last-write-wins; a label vector that does not match the
/// schema arity the families were registered with is a programming
/// error and panics.
pub struct ValidatorMetrics {
    balance: GaugeVec,
    exited: GaugeVec,
    credentials_code: GaugeVec,
    last_attestation_slot: GaugeVec,
    total_withdrawals: GaugeVec,
}

impl ValidatorMetrics {
    pub fn new(labels: &[String], registry: &Registry) -> Result<Self, prometheus::Error> {
        let names: Vec<&str> = labels.iter().map(String::as_str).collect();

        let gauge = |name: &str, help: &str| -> Result<GaugeVec, prometheus::Error> {
            let gauge = GaugeVec::new(Opts::new(name, help), &names)?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };

        Ok(Self {
            balance: gauge("balance", "The balance of the validator.")?,
            exited: gauge("exited", "The exited status of the validator.")?,
            credentials_code: gauge(
                "credentials_code",
                "The withdrawal credentials code of the validator.",
            )?,
            last_attestation_slot: gauge(
                "last_attestation_slot",
                "The last attestation slot of the validator.",
            )?,
            total_withdrawals: gauge(
                "total_withdrawals",
                "The total withdrawals of the validator.",
            )?,
        })
    }

    pub fn set_balance(&self, value: f64, labels: &[&str]) {
        self.balance.with_label_values(labels).set(value);
    }

    pub fn set_exited(&self, value: f64, labels: &[&str]) {
        self.exited.with_label_values(labels).set(value);
    }

    pub fn set_credentials_code(&self, value: f64, labels: &[&str]) {
        self.credentials_code.with_label_values(labels).set(value);
    }

    pub fn set_last_attestation_slot(&self, value: f64, labels: &[&str]) {
        self.last_attestation_slot.with_label_values(labels).set(value);
    }

    pub fn set_total_withdrawals(&self, value: f64, labels: &[&str]) {
        self.total_withdrawals.with_label_values(labels).set(value);
    }

    /// Apply every family for one snapshot.
    ///
    /// A malformed withdrawal-credential prefix is logged and recorded
    /// as 0; the snapshot's other families are still updated.
    pub fn update_from(&self, snapshot: &Validator, labels: &[String]) {
        let values: Vec<&str> = labels.iter().map(String::as_str).collect();

        self.set_balance(snapshot.balance as f64, &values);
        self.set_exited(if snapshot.is_exited() { 1.0 } else { 0.0 }, &values);

        let code = match snapshot.withdrawal_credentials_code() {
            Ok(code) => code as f64,
            Err(e) => {
                warn!(
                    pubkey = %snapshot.pubkey,
                    error = %e,
                    "Failed to decode withdrawal credentials code"
                );
                0.0
            }
        };
        self.set_credentials_code(code, &values);

        self.set_last_attestation_slot(snapshot.last_attestation_slot as f64, &values);
        self.set_total_withdrawals(snapshot.total_withdrawals as f64, &values);
    }
}
