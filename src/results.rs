use crate::util::pad_omega;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Index;

/// Correlation energies of one run, keyed by `eng_corr_<SCHEME>` (optionally qualified by omega).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct IEPAResults {
    energies: BTreeMap<String, f64>,
}

impl IEPAResults {
    pub(crate) fn insert(&mut self, token: &str, omega: f64, e_corr: f64) {
        self.energies.insert(pad_omega(token, omega), e_corr);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.energies.get(key).copied()
    }

    /// Energy of a scheme token (e.g. `"MP2CR"`) at screening parameter `omega`.
    pub fn get_scheme(&self, token: &str, omega: f64) -> Option<f64> {
        self.get(&pad_omega(token, omega))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.energies.iter().map(|(key, &val)| (key.as_str(), val))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.energies.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.energies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.energies.is_empty()
    }
}

impl Index<&str> for IEPAResults {
    type Output = f64;

    fn index(&self, key: &str) -> &f64 {
        match self.energies.get(key) {
            Some(val) => val,
            None => panic!("no correlation energy entry '{key}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_and_serialization() {
        let mut results = IEPAResults::default();
        results.insert("MP2", 0.0, -0.27);
        results.insert("SIEPA", 0.7, -0.25);
        assert_eq!(results.len(), 2);
        assert_eq!(results["eng_corr_MP2"], -0.27);
        assert_eq!(results.get_scheme("SIEPA", 0.7), Some(-0.25));
        assert!(results.get("eng_corr_SIEPA").is_none());

        let json = serde_json::to_string(&results).unwrap();
        assert_eq!(json, r#"{"eng_corr_MP2":-0.27,"eng_corr_SIEPA_omega(0.700000)":-0.25}"#);
    }
}
