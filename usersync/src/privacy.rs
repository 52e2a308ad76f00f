/// Consent answers the chooser needs for one request.
pub trait Privacy: Send + Sync {
    fn gdpr_allows_host_cookie(&self) -> bool;
    fn gdpr_allows_bidder_sync(&self, bidder: &str) -> bool;
    fn gdpr_in_scope(&self) -> bool;
    fn ccpa_allows_bidder_sync(&self, bidder: &str) -> bool;
    fn activity_allows_user_sync(&self, bidder: &str) -> bool;
}

/// Request privacy values substituted into sync urls at render time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrivacyMacros {
    pub gdpr: String,
    pub gdpr_consent: String,
    pub us_privacy: String,
    pub gpp: String,
    pub gpp_sid: String,
}

impl PrivacyMacros {
    /// Stand-in values used to check that a composed template renders to a url.
    pub(crate) fn placeholders() -> Self {
        PrivacyMacros {
            gdpr: "anyGDPR".to_string(),
            gdpr_consent: "anyGDPRConsent".to_string(),
            us_privacy: "anyCCPAConsent".to_string(),
            gpp: "anyGPP".to_string(),
            gpp_sid: "anyGPPSID".to_string(),
        }
    }
}
