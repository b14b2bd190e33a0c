//! The configuration surface and its resolution into typed settings.
//!
//! The host stores widget configuration as a flat document with camelCase keys.
//! [`Settings`] mirrors that document with every key optional; [`Settings::resolve`]
//! applies defaults and validation and produces [`TriggerSettings`].
//!
//! Resolution degrades gracefully where the widget can still operate: an empty
//! target URL disables triggering, and an unusable `responseLength` falls back
//! to [`MessageDuration::DEFAULT`]. Values that cannot mean anything sensible
//! (an unparsable URL, an unknown method) are reported as [`ConfigError`].

use std::collections::BTreeSet;

use serde::Deserialize;
use url::Url;

use crate::{
    ConfigError, DataSourceMode, Header, HttpMethod, MessageDuration, PermissionPolicy,
    PermissionRule, ResponseTemplates, TableId, TableInfo, TableName, UserId, ViewId,
    WebhookConfig,
};

/// Raw settings document as stored by the host.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub webhook_proxy: Option<String>,
    pub webhook_link: Option<String>,
    pub webhook_path: Option<String>,
    pub webhook_method: Option<String>,
    pub webhook_headers: Vec<Header>,
    pub webhook_data_type: Option<String>,
    pub webhook_data_manual: Option<String>,
    pub webhook_data_table: Option<String>,
    pub webhook_data_view: Option<String>,
    pub permission_trigger: Option<String>,
    pub selected_users: Vec<String>,
    pub response_success: Option<String>,
    pub response_fail: Option<String>,
    pub response_length: Option<NumericText>,
    pub table_ignore: Option<String>,
    pub auto_rebuild: bool,
}

/// A numeric setting the host may store either as text or as a number.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumericText {
    Number(f64),
    Text(String),
}

/// Fully resolved settings for one mounted controller.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerSettings {
    pub webhook: WebhookConfig,
    pub permission: PermissionPolicy,
    pub data_source: DataSourceMode,
    pub templates: ResponseTemplates,
    pub watch: WatchSettings,
}

/// Auto-rebuild configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSettings {
    /// Whether data changes re-trigger the webhook.
    pub enabled: bool,
    /// Table names excluded from watching (exact, case-sensitive).
    pub ignore: Vec<TableName>,
}

impl WatchSettings {
    /// The tables to watch: every host table whose name is not ignored, in
    /// host order.
    pub fn watch_set(&self, tables: &[TableInfo]) -> Vec<TableInfo> {
        tables
            .iter()
            .filter(|table| !self.ignore.contains(&table.name))
            .cloned()
            .collect()
    }
}

impl Settings {
    /// Parses a settings document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Applies defaults and validation.
    pub fn resolve(&self) -> Result<TriggerSettings, ConfigError> {
        Ok(TriggerSettings {
            webhook: self.resolve_webhook()?,
            permission: PermissionPolicy::new(self.resolve_permission()?),
            data_source: self.resolve_data_source()?,
            templates: self.resolve_templates(),
            watch: WatchSettings {
                enabled: self.auto_rebuild,
                ignore: parse_ignore_list(self.table_ignore.as_deref().unwrap_or_default()),
            },
        })
    }

    fn resolve_webhook(&self) -> Result<WebhookConfig, ConfigError> {
        let http_method = match non_empty(&self.webhook_method) {
            Some(method) => HttpMethod::parse(method)
                .ok_or_else(|| ConfigError::UnsupportedMethod(method.to_string()))?,
            None => HttpMethod::Post,
        };
        let path_override = non_empty(&self.webhook_path).map(|path| {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        });

        Ok(WebhookConfig {
            proxy_url: parse_url("webhookProxy", &self.webhook_proxy)?,
            target_url: parse_url("webhookLink", &self.webhook_link)?,
            path_override,
            http_method,
            headers: self
                .webhook_headers
                .iter()
                .filter(|h| !h.name.trim().is_empty())
                .cloned()
                .collect(),
        })
    }

    fn resolve_permission(&self) -> Result<PermissionRule, ConfigError> {
        let rule = match non_empty(&self.permission_trigger) {
            None | Some("everyone") => PermissionRule::Everyone,
            Some("selected") => {
                let allowed: BTreeSet<UserId> =
                    self.selected_users.iter().filter_map(UserId::new).collect();
                PermissionRule::SpecificUsers(allowed)
            }
            Some("creator") => PermissionRule::CreatorOnly,
            Some("collaborators") => PermissionRule::CollaboratorsOnly,
            Some(other) => return Err(ConfigError::UnknownPermission(other.to_string())),
        };
        Ok(rule)
    }

    fn resolve_data_source(&self) -> Result<DataSourceMode, ConfigError> {
        let table = || {
            non_empty(&self.webhook_data_table)
                .and_then(TableId::new)
                .ok_or(ConfigError::MissingSetting {
                    mode: "table",
                    key: "webhookDataTable",
                })
        };

        let mode = match non_empty(&self.webhook_data_type) {
            None | Some("manual") => DataSourceMode::Manual(
                self.webhook_data_manual
                    .clone()
                    .unwrap_or_else(|| "{}".to_string()),
            ),
            Some("cells") => DataSourceMode::Cells,
            Some("table") => DataSourceMode::Table(table()?),
            Some("view") => {
                let table = table().map_err(|_| ConfigError::MissingSetting {
                    mode: "view",
                    key: "webhookDataTable",
                })?;
                let view = non_empty(&self.webhook_data_view)
                    .and_then(ViewId::new)
                    .ok_or(ConfigError::MissingSetting {
                        mode: "view",
                        key: "webhookDataView",
                    })?;
                DataSourceMode::View(table, view)
            }
            Some(other) => return Err(ConfigError::UnknownDataSource(other.to_string())),
        };
        Ok(mode)
    }

    fn resolve_templates(&self) -> ResponseTemplates {
        let defaults = ResponseTemplates::default();
        let display_for = match &self.response_length {
            Some(NumericText::Number(ms)) => MessageDuration::parse_lenient(&ms.to_string()),
            Some(NumericText::Text(text)) => MessageDuration::parse_lenient(text),
            None => MessageDuration::DEFAULT,
        };
        ResponseTemplates {
            success: self.response_success.clone().unwrap_or(defaults.success),
            fail: self.response_fail.clone().unwrap_or(defaults.fail),
            display_for,
        }
    }
}

/// Splits the comma-separated ignore list, trimming each name.
pub fn parse_ignore_list(value: &str) -> Vec<TableName> {
    value
        .split(',')
        .filter_map(|name| TableName::new(name.trim()))
        .collect()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_url(key: &'static str, value: &Option<String>) -> Result<Option<Url>, ConfigError> {
    non_empty(value)
        .map(|raw| {
            Url::parse(raw).map_err(|_| ConfigError::InvalidUrl {
                key,
                value: raw.to_string(),
            })
        })
        .transpose()
}
