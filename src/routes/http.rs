//! HTTP endpoint handlers. These are thin wrappers around the upload gateway
//! and the conversion invoker. Each handler is instrumented.

use std::sync::Arc;

use axum::{
  extract::{Multipart, State},
  http::HeaderMap,
  response::{Html, IntoResponse, Response},
  Json,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::convert::Archive;
use crate::error::{ConvertError, ErrorFormat};
use crate::protocol::HealthOut;
use crate::routes::page::render_index;
use crate::state::AppState;
use crate::upload::Upload;
use crate::workdir::WorkDir;

#[instrument(level = "info")]
pub async fn http_index() -> Html<String> {
  Html(render_index(None))
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, converter: state.invoker.provider_name() })
}

#[instrument(level = "info", skip_all, fields(conversion_id = %Uuid::new_v4()))]
pub async fn http_post_convert(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  multipart: Multipart,
) -> Response {
  match convert_upload(&state, multipart).await {
    Ok(archive) => {
      info!(target: "conversion", archive = %archive.name, size = archive.bytes.len(), "HTTP conversion served");
      archive.into_response()
    }
    Err(e) => e.render(ErrorFormat::from_headers(&headers), state.invoker.expose_diagnostics()),
  }
}

/// awaiting upload → staged → converting → archive / error. The working
/// directory is released before the response is sent, whatever the outcome.
/// A conversion abandoned by the timeout releases it when it stops.
async fn convert_upload(state: &AppState, mut multipart: Multipart) -> Result<Archive, ConvertError> {
  let upload = Upload::from_multipart(&mut multipart).await?;
  info!(
    target: "conversion",
    filename = %upload.filename,
    content_type = ?upload.content_type,
    size = upload.bytes.len(),
    "Upload received"
  );
  upload.check_extension(state.upload.require_txt_extension)?;

  let workdir = WorkDir::create(state.upload.work_root.as_deref())?;
  let input = workdir.stage(&upload).await?;
  let archive = state.invoker.convert(&input).await;
  drop(input);
  drop(workdir);
  archive
}

#[cfg(test)]
mod tests {
  use std::io::{Cursor, Read};

  use axum::{
    body::{to_bytes, Body},
    http::{
      header::{ACCEPT, CONTENT_DISPOSITION, CONTENT_TYPE},
      Request, StatusCode,
    },
    Router,
  };
  use tower::ServiceExt;

  use super::*;
  use crate::config::{ProviderCfg, ServerConfig};
  use crate::routes::build_router;

  const BOUNDARY: &str = "qti-test-boundary";
  const SAMPLE: &str = "1. What is 2+3?\na) 6\nb) 1\n*c) 5\n";

  struct Harness {
    root: tempfile::TempDir,
    app: Router,
  }

  impl Harness {
    fn new(edit: impl FnOnce(&mut ServerConfig)) -> Self {
      let root = tempfile::tempdir().unwrap();
      let mut cfg = ServerConfig::default();
      cfg.upload.work_root = Some(root.path().to_path_buf());
      edit(&mut cfg);
      let app = build_router(Arc::new(AppState::new(&cfg)));
      Self { root, app }
    }

    /// Working directories still present under the root.
    fn leftover_dirs(&self) -> usize {
      std::fs::read_dir(self.root.path()).unwrap().count()
    }

    async fn send(&self, req: Request<Body>) -> Response {
      self.app.clone().oneshot(req).await.unwrap()
    }
  }

  fn multipart_request(parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (name, filename, content) in parts {
      body.push_str(&format!("--{BOUNDARY}\r\n"));
      match filename {
        Some(f) => body.push_str(&format!(
          "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\nContent-Type: text/plain\r\n\r\n"
        )),
        None => body.push_str(&format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")),
      }
      body.push_str(content);
      body.push_str("\r\n");
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    Request::builder()
      .method("POST")
      .uri("/convert")
      .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
      .body(Body::from(body))
      .unwrap()
  }

  fn upload_request(filename: &str, content: &str) -> Request<Body> {
    multipart_request(&[("file", Some(filename), content)])
  }

  async fn body_bytes(resp: Response) -> Vec<u8> {
    to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec()
  }

  /// Text of the assessment XML inside a QTI zip.
  fn assessment_xml(zip_bytes: &[u8]) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(zip_bytes)).unwrap();
    let name = archive
      .file_names()
      .find(|n| n.ends_with(".xml") && *n != "imsmanifest.xml" && !n.ends_with("assessment_meta.xml"))
      .map(str::to_owned)
      .expect("assessment entry");
    let mut out = String::new();
    archive.by_name(&name).unwrap().read_to_string(&mut out).unwrap();
    out
  }

  #[tokio::test]
  async fn index_serves_upload_form() {
    let h = Harness::new(|_| {});
    let resp = h.send(Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = String::from_utf8(body_bytes(resp).await).unwrap();
    assert!(html.contains("enctype=\"multipart/form-data\""));
  }

  #[tokio::test]
  async fn health_reports_converter() {
    let h = Harness::new(|_| {});
    let resp = h.send(Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let v: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(v, serde_json::json!({ "ok": true, "converter": "builtin" }));
  }

  #[tokio::test]
  async fn converts_sample_quiz_to_zip() {
    let h = Harness::new(|_| {});
    let resp = h.send(upload_request("quiz.txt", SAMPLE)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[CONTENT_TYPE], "application/zip");
    assert_eq!(resp.headers()[CONTENT_DISPOSITION], "attachment; filename=\"quiz.zip\"");

    let bytes = body_bytes(resp).await;
    let mut archive = zip::ZipArchive::new(Cursor::new(&bytes[..])).unwrap();
    assert!(archive.by_name("imsmanifest.xml").is_ok());
    let xml = assessment_xml(&bytes);
    assert_eq!(xml.matches("<item ").count(), 1);
    assert!(xml.contains("multiple_choice_question"));
    assert!(xml.contains("<mattext texttype=\"text/plain\">5</mattext>"));
    assert_eq!(h.leftover_dirs(), 0);
  }

  #[tokio::test]
  async fn wrong_extension_is_rejected_before_staging() {
    let h = Harness::new(|_| {});
    let resp = h.send(upload_request("quiz.docx", SAMPLE)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let html = String::from_utf8(body_bytes(resp).await).unwrap();
    assert!(html.contains("`quiz.docx` is not a .txt file"), "{html}");
    assert_eq!(h.leftover_dirs(), 0);
  }

  #[tokio::test]
  async fn extension_check_can_be_turned_off() {
    let h = Harness::new(|cfg| cfg.upload.require_txt_extension = false);
    let resp = h.send(upload_request("notes.md", SAMPLE)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[CONTENT_DISPOSITION], "attachment; filename=\"notes.zip\"");
  }

  #[tokio::test]
  async fn empty_file_is_a_server_error_without_archive() {
    let h = Harness::new(|_| {});
    let resp = h.send(upload_request("empty.txt", "")).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_ne!(resp.headers()[CONTENT_TYPE], "application/zip");
    let html = String::from_utf8(body_bytes(resp).await).unwrap();
    assert!(html.contains("quiz contains no questions"), "{html}");
    assert_eq!(h.leftover_dirs(), 0);
  }

  #[tokio::test]
  async fn malformed_quiz_shows_generic_notice_when_diagnostics_hidden() {
    let h = Harness::new(|cfg| cfg.converter.expose_diagnostics = false);
    let resp = h.send(upload_request("bad.txt", "1. Q\na) x\nb) y\n")).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let html = String::from_utf8(body_bytes(resp).await).unwrap();
    assert!(html.contains("Formatting issue detected"));
    assert!(!html.contains("line 1"));
    assert_eq!(h.leftover_dirs(), 0);
  }

  #[tokio::test]
  async fn json_clients_get_structured_errors() {
    let h = Harness::new(|_| {});
    let mut req = upload_request("bad.txt", "1. Q\na) x\nc) y\n");
    req.headers_mut().insert(ACCEPT, "application/json".parse().unwrap());
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let v: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(v["error"], "conversion_failed");
    assert_eq!(v["message"], "line 3: expected choice `b)` but found `c)`");
  }

  #[tokio::test]
  async fn dot_stem_filename_is_refused_before_staging() {
    let h = Harness::new(|_| {});
    let mut req = upload_request("..txt", "1. Q\n___\n");
    req.headers_mut().insert(ACCEPT, "application/json".parse().unwrap());
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let v: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(v["error"], "invalid_filename");
    assert_eq!(h.leftover_dirs(), 0);
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn timed_out_conversion_leaves_no_directory() {
    let h = Harness::new(|cfg| {
      cfg.converter.timeout_secs = 1;
      cfg.converter.provider = ProviderCfg::Command {
        program: "sh".into(),
        args: vec!["-c".into(), "sleep 10".into(), "sh".into()],
      };
    });
    let resp = h.send(upload_request("quiz.txt", SAMPLE)).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let html = String::from_utf8(body_bytes(resp).await).unwrap();
    assert!(html.contains("conversion timed out after 1s"), "{html}");
    assert_eq!(h.leftover_dirs(), 0);
  }

  #[tokio::test]
  async fn missing_file_part_is_a_client_error() {
    let h = Harness::new(|_| {});
    let resp = h.send(multipart_request(&[("comment", None, "hello")])).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn second_file_part_is_rejected() {
    let h = Harness::new(|_| {});
    let req = multipart_request(&[("file", Some("a.txt"), SAMPLE), ("file", Some("b.txt"), SAMPLE)]);
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.leftover_dirs(), 0);
  }

  #[tokio::test]
  async fn oversized_upload_is_rejected() {
    let h = Harness::new(|cfg| cfg.upload.max_upload_bytes = 256);
    let big = format!("1. {}\n___\n", "x".repeat(4096));
    let resp = h.send(upload_request("big.txt", &big)).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(h.leftover_dirs(), 0);
  }

  #[tokio::test]
  async fn concurrent_requests_get_their_own_archives() {
    let h = Harness::new(|_| {});
    let (a, b) = tokio::join!(
      h.send(upload_request("quiz.txt", "1. Alpha question?\n*a) yes\nb) no\n")),
      h.send(upload_request("quiz.txt", "1. Beta question?\n___\n")),
    );
    assert_eq!(a.status(), StatusCode::OK);
    assert_eq!(b.status(), StatusCode::OK);

    let xml_a = assessment_xml(&body_bytes(a).await);
    let xml_b = assessment_xml(&body_bytes(b).await);
    assert!(xml_a.contains("Alpha question?") && !xml_a.contains("Beta"));
    assert!(xml_b.contains("Beta question?") && !xml_b.contains("Alpha"));
    assert_eq!(h.leftover_dirs(), 0);
  }
}
