//! Billing profiles loaded from the customer directory sheet.

use serde::Serialize;
use std::collections::HashMap;

/// Bill-to identity for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingProfile {
    pub account_id: String,
    pub company_name: String,
    pub company_address: String,
    pub invoice_code: String,
    pub business_unit: Option<String>,
}

/// A directory row excluded because a required field was blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncompleteProfile {
    pub account_id: String,
    pub field: &'static str,
}

/// Profiles keyed by account id, plus the rows that could not become one.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    profiles: HashMap<String, BillingProfile>,
    pub missing_company_names: Vec<String>,
    pub incomplete_profiles: Vec<IncompleteProfile>,
}

impl Directory {
    pub fn insert(&mut self, profile: BillingProfile) {
        self.profiles.insert(profile.account_id.clone(), profile);
    }

    pub fn get(&self, account_id: &str) -> Option<&BillingProfile> {
        self.profiles.get(account_id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
