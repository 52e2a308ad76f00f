use crate::config::{SyncerConfig, SyncerEndpoint, UserSyncConfig};
use crate::privacy::PrivacyMacros;
use crate::template::{ExternalUrls, Template, TemplateError, compose_template};
use serde::Serialize;
use std::fmt;

/// How the browser performs a sync.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    #[serde(rename = "iframe")]
    IFrame,
    Redirect,
}

impl SyncType {
    /// Value of the `f` query parameter on the setuid callback.
    pub fn format_value(&self) -> &'static str {
        match self {
            SyncType::IFrame => "b",
            SyncType::Redirect => "i",
        }
    }

    pub fn from_format_value(value: &str) -> Option<Self> {
        match value {
            "b" => Some(SyncType::IFrame),
            "i" => Some(SyncType::Redirect),
            _ => None,
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncType::IFrame => f.write_str("iframe"),
            SyncType::Redirect => f.write_str("redirect"),
        }
    }
}

/// A rendered sync instruction for the browser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncInfo {
    pub url: String,
    pub sync_type: SyncType,
    pub support_cors: bool,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncerError {
    #[error("no sync types provided")]
    NoSyncTypesProvided,
    #[error("no sync types supported")]
    NoSyncTypesSupported,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NewSyncerError {
    #[error("key is required")]
    MissingKey,
    #[error("at least one endpoint (iframe and/or redirect) is required")]
    MissingEndpoints,
    #[error("format_override must be either 'b' or 'i', got '{0}'")]
    InvalidFormatOverride(String),
    #[error("{sync_type} {source}")]
    Template {
        sync_type: SyncType,
        source: TemplateError,
    },
}

/// A configured sync url producer for one syncer key.
pub trait Syncer: Send + Sync + fmt::Debug {
    fn key(&self) -> &str;

    /// Response format the setuid endpoint uses when the request doesn't say.
    fn default_response_format(&self) -> SyncType;

    /// True if any of `sync_types` has a configured endpoint.
    fn supports_type(&self, sync_types: &[SyncType]) -> bool;

    fn get_sync(
        &self,
        sync_types: &[SyncType],
        macros: &PrivacyMacros,
    ) -> Result<SyncInfo, SyncerError>;
}

#[derive(Debug)]
pub struct StandardSyncer {
    key: String,
    default_sync_type: SyncType,
    format_override: Option<SyncType>,
    iframe: Option<Template>,
    redirect: Option<Template>,
    support_cors: bool,
}

impl StandardSyncer {
    /// Builds the syncer for `key` from the config owned by `bidder`.
    pub fn new(
        user_sync: &UserSyncConfig,
        host_external_url: &str,
        key: &str,
        bidder: &str,
        config: &SyncerConfig,
    ) -> Result<Self, NewSyncerError> {
        if key.is_empty() {
            return Err(NewSyncerError::MissingKey);
        }
        if !config.has_endpoints() {
            return Err(NewSyncerError::MissingEndpoints);
        }

        let format_override = match config.format_override.as_deref() {
            None | Some("") => None,
            Some(value) => Some(
                SyncType::from_format_value(value)
                    .ok_or_else(|| NewSyncerError::InvalidFormatOverride(value.to_string()))?,
            ),
        };

        let external_urls = ExternalUrls {
            syncer: &config.external_url,
            user_sync: &user_sync.external_url,
            host: host_external_url,
        };
        let build = |sync_type: SyncType, endpoint: &Option<SyncerEndpoint>| {
            endpoint
                .as_ref()
                .map(|endpoint| {
                    let template = compose_template(
                        bidder,
                        sync_type.format_value(),
                        user_sync,
                        &external_urls,
                        endpoint,
                    )?;
                    template.validate()?;
                    Ok::<_, TemplateError>(template)
                })
                .transpose()
                .map_err(|source| NewSyncerError::Template { sync_type, source })
        };

        let iframe = build(SyncType::IFrame, &config.iframe)?;
        let redirect = build(SyncType::Redirect, &config.redirect)?;
        let default_sync_type = if iframe.is_some() {
            SyncType::IFrame
        } else {
            SyncType::Redirect
        };

        Ok(StandardSyncer {
            key: key.to_string(),
            default_sync_type,
            format_override,
            iframe,
            redirect,
            support_cors: config.support_cors.unwrap_or(false),
        })
    }

    fn template(&self, sync_type: SyncType) -> Option<&Template> {
        match sync_type {
            SyncType::IFrame => self.iframe.as_ref(),
            SyncType::Redirect => self.redirect.as_ref(),
        }
    }

    fn filter_supported_sync_types(&self, sync_types: &[SyncType]) -> Vec<SyncType> {
        sync_types
            .iter()
            .copied()
            .filter(|t| self.template(*t).is_some())
            .collect()
    }

    fn choose_sync_type(&self, supported: &[SyncType]) -> SyncType {
        if supported.contains(&self.default_sync_type) {
            self.default_sync_type
        } else {
            supported[0]
        }
    }
}

impl Syncer for StandardSyncer {
    fn key(&self) -> &str {
        &self.key
    }

    fn default_response_format(&self) -> SyncType {
        self.format_override.unwrap_or(self.default_sync_type)
    }

    fn supports_type(&self, sync_types: &[SyncType]) -> bool {
        !self.filter_supported_sync_types(sync_types).is_empty()
    }

    fn get_sync(
        &self,
        sync_types: &[SyncType],
        macros: &PrivacyMacros,
    ) -> Result<SyncInfo, SyncerError> {
        if sync_types.is_empty() {
            return Err(SyncerError::NoSyncTypesProvided);
        }
        let supported = self.filter_supported_sync_types(sync_types);
        if supported.is_empty() {
            return Err(SyncerError::NoSyncTypesSupported);
        }

        let sync_type = self.choose_sync_type(&supported);
        let url = self
            .template(sync_type)
            .map(|template| template.render(macros))
            .ok_or(SyncerError::NoSyncTypesSupported)?;

        Ok(SyncInfo {
            url,
            sync_type,
            support_cors: self.support_cors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(url: &str) -> SyncerEndpoint {
        SyncerEndpoint {
            url: url.to_string(),
            ..Default::default()
        }
    }

    fn build(config: SyncerConfig) -> Result<StandardSyncer, NewSyncerError> {
        StandardSyncer::new(
            &UserSyncConfig::default(),
            "http://host.com",
            "bidderA",
            "bidderA",
            &config,
        )
    }

    fn macros() -> PrivacyMacros {
        PrivacyMacros {
            gdpr: "A".into(),
            gdpr_consent: "B".into(),
            us_privacy: "C".into(),
            ..Default::default()
        }
    }

    fn both() -> StandardSyncer {
        build(SyncerConfig {
            iframe: Some(endpoint(
                "https://iframe.com/?gdpr={{.GDPR}}&consent={{.GDPRConsent}}&ccpa={{.USPrivacy}}",
            )),
            redirect: Some(endpoint(
                "https://redirect.com/?gdpr={{.GDPR}}&consent={{.GDPRConsent}}&ccpa={{.USPrivacy}}",
            )),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_new_errors() {
        assert_eq!(
            build(SyncerConfig::default()).unwrap_err(),
            NewSyncerError::MissingEndpoints
        );

        let err = StandardSyncer::new(
            &UserSyncConfig::default(),
            "",
            "",
            "bidderA",
            &SyncerConfig {
                redirect: Some(endpoint("https://a.com")),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err, NewSyncerError::MissingKey);

        let err = build(SyncerConfig {
            iframe: Some(endpoint("not-a-url")),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "iframe composed url \"not-a-url\" is invalid"
        );

        let err = build(SyncerConfig {
            redirect: Some(endpoint("https://a.com/?x={{.Nope}}")),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(
            err,
            NewSyncerError::Template {
                sync_type: SyncType::Redirect,
                source: TemplateError::UnknownField { .. }
            }
        ));

        let err = build(SyncerConfig {
            redirect: Some(endpoint("https://a.com")),
            format_override: Some("x".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err, NewSyncerError::InvalidFormatOverride("x".into()));
    }

    #[test]
    fn test_default_sync_type_and_format_override() {
        assert_eq!(both().default_response_format(), SyncType::IFrame);

        let redirect_only = build(SyncerConfig {
            redirect: Some(endpoint("https://a.com")),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(redirect_only.default_response_format(), SyncType::Redirect);

        let overridden = build(SyncerConfig {
            iframe: Some(endpoint("https://a.com")),
            format_override: Some("i".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(overridden.default_response_format(), SyncType::Redirect);
    }

    #[test]
    fn test_supports_type() {
        let syncer = both();
        assert!(!syncer.supports_type(&[]));
        assert!(syncer.supports_type(&[SyncType::IFrame]));
        assert!(syncer.supports_type(&[SyncType::IFrame, SyncType::Redirect]));

        let iframe_only = build(SyncerConfig {
            iframe: Some(endpoint("https://a.com")),
            ..Default::default()
        })
        .unwrap();
        assert!(iframe_only.supports_type(&[SyncType::IFrame]));
        assert!(!iframe_only.supports_type(&[SyncType::Redirect]));
        assert!(iframe_only.supports_type(&[SyncType::IFrame, SyncType::Redirect]));
    }

    #[test]
    fn test_get_sync() {
        let syncer = both();
        assert_eq!(
            syncer.get_sync(&[], &macros()).unwrap_err(),
            SyncerError::NoSyncTypesProvided
        );
        assert_eq!(
            syncer.get_sync(&[SyncType::IFrame], &macros()).unwrap(),
            SyncInfo {
                url: "https://iframe.com/?gdpr=A&consent=B&ccpa=C".into(),
                sync_type: SyncType::IFrame,
                support_cors: false,
            }
        );
        assert_eq!(
            syncer.get_sync(&[SyncType::Redirect], &macros()).unwrap(),
            SyncInfo {
                url: "https://redirect.com/?gdpr=A&consent=B&ccpa=C".into(),
                sync_type: SyncType::Redirect,
                support_cors: false,
            }
        );
        // default wins when both are requested
        assert_eq!(
            syncer
                .get_sync(&[SyncType::Redirect, SyncType::IFrame], &macros())
                .unwrap()
                .sync_type,
            SyncType::IFrame
        );

        let redirect_only = build(SyncerConfig {
            redirect: Some(endpoint("https://a.com")),
            support_cors: Some(true),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            redirect_only
                .get_sync(&[SyncType::IFrame], &macros())
                .unwrap_err(),
            SyncerError::NoSyncTypesSupported
        );
        assert!(
            redirect_only
                .get_sync(&[SyncType::IFrame, SyncType::Redirect], &macros())
                .unwrap()
                .support_cors
        );
    }

    #[test]
    fn test_default_redirect_url() {
        let syncer = build(SyncerConfig {
            redirect: Some(SyncerEndpoint {
                url: "https://bidder.com/sync?r={{.RedirectURL}}".into(),
                user_macro: "$UID".into(),
                ..Default::default()
            }),
            ..Default::default()
        })
        .unwrap();
        let sync = syncer
            .get_sync(&[SyncType::Redirect], &PrivacyMacros::default())
            .unwrap();
        assert_eq!(
            sync.url,
            "https://bidder.com/sync?r=http%3A%2F%2Fhost.com%2Fsetuid%3Fbidder%3DbidderA%26gdpr%3D%26gdpr_consent%3D%26gpp%3D%26gpp_sid%3D%26f%3Di%26uid%3D%24UID"
        );
    }

    #[test]
    fn test_sync_type_serialization() {
        assert_eq!(
            serde_json::to_string(&SyncType::IFrame).unwrap(),
            "\"iframe\""
        );
        assert_eq!(
            serde_json::to_string(&SyncType::Redirect).unwrap(),
            "\"redirect\""
        );
    }
}
