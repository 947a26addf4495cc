//! SPA shell and built asset serving

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use studio_common::RouteMatch;
use tracing::{debug, warn};

/// Built SPA assets on disk, with an embedded shell when none are present
#[derive(Debug, Clone, Default)]
pub struct SpaAssets {
    dist_dir: Option<PathBuf>,
}

impl SpaAssets {
    pub fn new(dist_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = &dist_dir {
            if !dir.join("index.html").exists() {
                warn!(
                    "No index.html in {}; serving the embedded shell",
                    dir.display()
                );
            }
        }
        Self { dist_dir }
    }

    pub fn dist_dir(&self) -> Option<&PathBuf> {
        self.dist_dir.as_ref()
    }

    /// Serve a built file under the dist directory, if one exists at `path`.
    ///
    /// Returns `None` for directories and missing files so the caller can
    /// fall through to route resolution.
    pub async fn serve_file(&self, path: &str) -> Option<Response> {
        let dir = self.dist_dir.as_ref()?;
        let rel = path.trim_start_matches('/');
        if rel.is_empty() {
            return None;
        }

        let requested = dir.join(rel);

        // Canonicalize both sides so `..` cannot escape the dist directory.
        let canon_dir = dir.canonicalize().ok()?;
        let canon_req = requested.canonicalize().ok()?;
        if !canon_req.starts_with(&canon_dir) {
            return Some((StatusCode::FORBIDDEN, "Forbidden").into_response());
        }
        if !canon_req.is_file() {
            return None;
        }

        match tokio::fs::read(&canon_req).await {
            Ok(bytes) => {
                let mime = mime_guess::from_path(&canon_req).first_or_octet_stream();
                debug!("Serving asset {} ({} bytes)", rel, bytes.len());
                Some(
                    (
                        StatusCode::OK,
                        [(header::CONTENT_TYPE, mime.as_ref())],
                        bytes,
                    )
                        .into_response(),
                )
            }
            Err(e) => {
                warn!("Failed to read asset {}: {}", canon_req.display(), e);
                None
            }
        }
    }

    /// The shell page with the resolved route embedded for the client
    pub async fn render_shell(&self, route: &RouteMatch) -> String {
        let html = self.index_html().await;
        let payload = serde_json::to_string(route)
            .unwrap_or_else(|_| "null".to_string())
            .replace("</", "<\\/");
        let tag = format!(
            r#"<script id="studio-route" type="application/json">{}</script>"#,
            payload
        );

        match html.find("</head>") {
            Some(pos) => {
                let mut out = String::with_capacity(html.len() + tag.len());
                out.push_str(&html[..pos]);
                out.push_str(&tag);
                out.push_str(&html[pos..]);
                out
            }
            None => format!("{}{}", tag, html),
        }
    }

    async fn index_html(&self) -> String {
        if let Some(dir) = &self.dist_dir {
            if let Ok(html) = tokio::fs::read_to_string(dir.join("index.html")).await {
                return html;
            }
        }
        SHELL_HTML.to_string()
    }
}

const SHELL_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Automation Studio</title>
</head>
<body>
    <div id="app"></div>
    <noscript>Build the frontend and set server.dist_dir to serve the app.</noscript>
</body>
</html>
"#;
