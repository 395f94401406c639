//! MediaWiki Action API client.
//!
//! Implements [`WikiAdapter`] over the `api.php` endpoint: bot login (login
//! token → `action=login` → CSRF token), paged `allpages` / `revisions` /
//! `logevents` queries, and bot-flagged `edit` / `delete` writes. One client
//! is bound to one namespace and title filter.

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::WikiAdapter;
use crate::errors::WikiError;
use crate::models::{PageRevision, RevisionKind};

/// Summary attached to synthesized resync revisions.
const RESYNC_COMMENT: &str = "forced resync from wiki";

/// MediaWiki Action API client for one namespace/title-filter binding.
pub struct MediaWikiClient {
    http: reqwest::Client,
    api_url: String,
    namespace: String,
    namespace_id: i64,
    title_filter: Regex,
    csrf_token: String,
}

impl MediaWikiClient {
    /// Log in as the bot and resolve the namespace and CSRF token.
    pub async fn connect(
        api_url: &str,
        username: &str,
        password: &str,
        namespace: &str,
        title_filter: Regex,
    ) -> Result<Self, WikiError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(concat!("GitWikiSync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        // Login token.
        let v = api_get(
            &http,
            api_url,
            &[
                ("action", "query"),
                ("meta", "tokens"),
                ("type", "login"),
                ("format", "json"),
            ],
        )
        .await?;
        let login_token = v["query"]["tokens"]["logintoken"]
            .as_str()
            .ok_or_else(|| WikiError::ParseError("missing login token".into()))?
            .to_string();

        // Bot login.
        let v = api_post(
            &http,
            api_url,
            &[
                ("action", "login"),
                ("lgname", username),
                ("lgpassword", password),
                ("lgtoken", &login_token),
                ("format", "json"),
            ],
        )
        .await?;
        let result = v["login"]["result"].as_str().unwrap_or("");
        if result != "Success" {
            return Err(WikiError::LoginFailed {
                username: username.to_string(),
                detail: result.to_string(),
            });
        }
        info!(username, "logged in to wiki");

        // Resolve the namespace name to its numeric id.
        let v = api_get(
            &http,
            api_url,
            &[
                ("action", "query"),
                ("meta", "siteinfo"),
                ("siprop", "namespaces"),
                ("format", "json"),
            ],
        )
        .await?;
        let mut namespace_id = None;
        if let Some(map) = v["query"]["namespaces"].as_object() {
            for ns in map.values() {
                let name = ns["name"].as_str().unwrap_or("");
                let canonical = ns["canonical"].as_str().unwrap_or("");
                if name == namespace || canonical == namespace {
                    namespace_id = ns["id"].as_i64();
                    break;
                }
            }
        }
        let namespace_id =
            namespace_id.ok_or_else(|| WikiError::UnknownNamespace(namespace.to_string()))?;

        // CSRF token for edits and deletes.
        let v = api_get(
            &http,
            api_url,
            &[
                ("action", "query"),
                ("meta", "tokens"),
                ("format", "json"),
            ],
        )
        .await?;
        let csrf_token = v["query"]["tokens"]["csrftoken"]
            .as_str()
            .ok_or_else(|| WikiError::ParseError("missing csrf token".into()))?
            .to_string();

        Ok(Self {
            http,
            api_url: api_url.to_string(),
            namespace: namespace.to_string(),
            namespace_id,
            title_filter,
            csrf_token,
        })
    }

    fn prefixed(&self, title: &str) -> String {
        if self.namespace.is_empty() {
            title.to_string()
        } else {
            format!("{}:{}", self.namespace, title)
        }
    }

    fn strip_namespace<'a>(&self, full_title: &'a str) -> &'a str {
        if self.namespace.is_empty() {
            return full_title;
        }
        full_title
            .strip_prefix(&format!("{}:", self.namespace))
            .unwrap_or(full_title)
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<Value, WikiError> {
        api_get(&self.http, &self.api_url, params).await
    }

    async fn post(&self, params: &[(&str, &str)]) -> Result<Value, WikiError> {
        api_post(&self.http, &self.api_url, params).await
    }

    /// Edit revisions of one page newer than `since`, oldest last.
    async fn page_revisions_since(
        &self,
        title: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PageRevision>, WikiError> {
        let full_title = self.prefixed(title);
        let end = since.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let v = self
            .get(&[
                ("action", "query"),
                ("prop", "revisions"),
                ("titles", &full_title),
                ("rvprop", "timestamp|user|comment|content"),
                ("rvslots", "main"),
                ("rvlimit", "max"),
                ("rvdir", "older"),
                ("rvend", &end),
                ("format", "json"),
            ])
            .await?;

        let mut revs = Vec::new();
        if let Some(pages) = v["query"]["pages"].as_object() {
            for page in pages.values() {
                let Some(revisions) = page["revisions"].as_array() else {
                    continue;
                };
                for rev in revisions {
                    let timestamp = parse_timestamp(rev["timestamp"].as_str().unwrap_or(""))?;
                    // rvend is inclusive at the boundary; the watermark skew
                    // already excludes the last synced revision.
                    if timestamp < since {
                        continue;
                    }
                    revs.push(PageRevision {
                        title: title.to_string(),
                        author: rev["user"].as_str().unwrap_or("").to_string(),
                        comment: rev["comment"].as_str().unwrap_or("").to_string(),
                        content: revision_content(rev),
                        timestamp,
                        kind: RevisionKind::Edit,
                    });
                }
            }
        }
        Ok(revs)
    }
}

impl WikiAdapter for MediaWikiClient {
    async fn list_pending_revisions(
        &self,
        since: DateTime<Utc>,
        force_full: bool,
    ) -> Result<Vec<PageRevision>, WikiError> {
        let mut revs = Vec::new();
        for title in self.list_titles().await? {
            revs.extend(self.page_revisions_since(&title, since).await?);
            if force_full {
                if let Some(rev) = self.latest_revision(&title).await? {
                    revs.push(rev);
                }
            }
        }
        revs.sort_by_key(|r| r.timestamp);
        debug!(count = revs.len(), "fetched pending wiki revisions");
        Ok(revs)
    }

    async fn latest_revision(&self, title: &str) -> Result<Option<PageRevision>, WikiError> {
        let full_title = self.prefixed(title);
        let v = self
            .get(&[
                ("action", "query"),
                ("prop", "revisions"),
                ("titles", &full_title),
                ("rvprop", "timestamp|user|comment|content"),
                ("rvslots", "main"),
                ("rvlimit", "1"),
                ("format", "json"),
            ])
            .await?;

        let Some(pages) = v["query"]["pages"].as_object() else {
            return Ok(None);
        };
        for page in pages.values() {
            if page.get("missing").is_some() {
                return Ok(None);
            }
            if let Some(rev) = page["revisions"].as_array().and_then(|a| a.first()) {
                return Ok(Some(PageRevision {
                    title: title.to_string(),
                    author: rev["user"].as_str().unwrap_or("").to_string(),
                    comment: RESYNC_COMMENT.to_string(),
                    content: revision_content(rev),
                    timestamp: Utc::now(),
                    kind: RevisionKind::Resync,
                }));
            }
        }
        Ok(None)
    }

    async fn last_delete_or_move(
        &self,
        title: &str,
    ) -> Result<Option<PageRevision>, WikiError> {
        let full_title = self.prefixed(title);
        let v = self
            .get(&[
                ("action", "query"),
                ("list", "logevents"),
                ("letitle", &full_title),
                ("lelimit", "max"),
                ("format", "json"),
            ])
            .await?;

        let Some(events) = v["query"]["logevents"].as_array() else {
            return Ok(None);
        };
        // Log events arrive newest first; only the most recent delete or
        // move matters.
        for event in events {
            let kind = match event["type"].as_str() {
                Some("delete") => RevisionKind::Delete,
                Some("move") => RevisionKind::Move,
                _ => continue,
            };
            let timestamp = parse_timestamp(event["timestamp"].as_str().unwrap_or(""))?;
            return Ok(Some(PageRevision {
                title: title.to_string(),
                author: event["user"].as_str().unwrap_or("").to_string(),
                comment: event["comment"].as_str().unwrap_or("").to_string(),
                content: None,
                timestamp,
                kind,
            }));
        }
        Ok(None)
    }

    async fn list_titles(&self) -> Result<Vec<String>, WikiError> {
        let ns_id = self.namespace_id.to_string();
        let mut titles = Vec::new();
        let mut cont: Option<String> = None;

        loop {
            let mut params = vec![
                ("action", "query"),
                ("list", "allpages"),
                ("apnamespace", ns_id.as_str()),
                ("aplimit", "max"),
                ("format", "json"),
            ];
            if let Some(c) = &cont {
                params.push(("apcontinue", c.as_str()));
            }
            let v = self.get(&params).await?;

            if let Some(pages) = v["query"]["allpages"].as_array() {
                for page in pages {
                    let full_title = page["title"].as_str().unwrap_or("");
                    let title = self.strip_namespace(full_title);
                    if self.title_filter.is_match(title) {
                        titles.push(title.to_string());
                    }
                }
            }

            cont = v["continue"]["apcontinue"].as_str().map(str::to_string);
            if cont.is_none() {
                break;
            }
        }
        Ok(titles)
    }

    async fn save_page(
        &self,
        title: &str,
        content: &str,
        summary: &str,
    ) -> Result<Option<u64>, WikiError> {
        let full_title = self.prefixed(title);
        let v = self
            .post(&[
                ("action", "edit"),
                ("title", &full_title),
                ("text", content),
                ("summary", summary),
                ("bot", "1"),
                ("token", &self.csrf_token),
                ("format", "json"),
            ])
            .await?;

        let result = v["edit"]["result"].as_str().unwrap_or("");
        if result != "Success" {
            return Err(WikiError::ApiError {
                code: "editfailed".into(),
                info: format!("unexpected edit result '{result}' for '{full_title}'"),
            });
        }
        // A null edit (identical content) has no new revision id.
        Ok(v["edit"]["newrevid"].as_u64())
    }

    async fn delete_page(&self, title: &str, reason: &str) -> Result<(), WikiError> {
        let full_title = self.prefixed(title);
        self.post(&[
            ("action", "delete"),
            ("title", &full_title),
            ("reason", reason),
            ("token", &self.csrf_token),
            ("format", "json"),
        ])
        .await?;
        Ok(())
    }

    async fn append_page(
        &self,
        title: &str,
        text: &str,
        summary: &str,
    ) -> Result<(), WikiError> {
        let full_title = self.prefixed(title);
        self.post(&[
            ("action", "edit"),
            ("title", &full_title),
            ("appendtext", text),
            ("summary", summary),
            ("bot", "1"),
            ("token", &self.csrf_token),
            ("format", "json"),
        ])
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

async fn api_get(
    http: &reqwest::Client,
    api_url: &str,
    params: &[(&str, &str)],
) -> Result<Value, WikiError> {
    let resp = http
        .get(api_url)
        .query(params)
        .send()
        .await?
        .error_for_status()?;
    check_api_error(resp.json().await?)
}

async fn api_post(
    http: &reqwest::Client,
    api_url: &str,
    params: &[(&str, &str)],
) -> Result<Value, WikiError> {
    let resp = http
        .post(api_url)
        .form(params)
        .send()
        .await?
        .error_for_status()?;
    check_api_error(resp.json().await?)
}

fn check_api_error(v: Value) -> Result<Value, WikiError> {
    if let Some(err) = v.get("error") {
        return Err(WikiError::ApiError {
            code: err["code"].as_str().unwrap_or("unknown").to_string(),
            info: err["info"].as_str().unwrap_or("").to_string(),
        });
    }
    if let Some(warnings) = v.get("warnings") {
        warn!(%warnings, "wiki API warnings");
    }
    Ok(v)
}

/// Page content from a revision object, preferring the slot-aware shape.
fn revision_content(rev: &Value) -> Option<String> {
    rev["slots"]["main"]["content"]
        .as_str()
        .or_else(|| rev["slots"]["main"]["*"].as_str())
        .or_else(|| rev["*"].as_str())
        .map(str::to_string)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, WikiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| WikiError::ParseError(format!("bad timestamp '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_api_error_maps_error_object() {
        let v = json!({"error": {"code": "badtoken", "info": "Invalid CSRF token."}});
        let err = check_api_error(v).unwrap_err();
        assert!(matches!(err, WikiError::ApiError { ref code, .. } if code == "badtoken"));
    }

    #[test]
    fn test_check_api_error_passes_success() {
        let v = json!({"query": {"pages": {}}});
        assert!(check_api_error(v).is_ok());
    }

    #[test]
    fn test_revision_content_shapes() {
        let slotted = json!({"slots": {"main": {"content": "new style"}}});
        assert_eq!(revision_content(&slotted).as_deref(), Some("new style"));

        let legacy = json!({"*": "old style"});
        assert_eq!(revision_content(&legacy).as_deref(), Some("old style"));

        let empty = json!({});
        assert_eq!(revision_content(&empty), None);
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("2026-01-15T10:30:00Z").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-01-15T10:30:00+00:00");
        assert!(parse_timestamp("not a time").is_err());
    }
}
