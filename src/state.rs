//! Application state shared by all requests.
//!
//! Nothing here is mutable: the upload settings and the conversion invoker
//! are fixed at startup and every request works in its own directory.

use tracing::{info, instrument};

use crate::config::{ServerConfig, UploadCfg};
use crate::convert::ConversionInvoker;

#[derive(Clone)]
pub struct AppState {
    pub upload: UploadCfg,
    pub invoker: ConversionInvoker,
}

impl AppState {
    #[instrument(level = "info", skip_all)]
    pub fn new(cfg: &ServerConfig) -> Self {
        let invoker = cfg.converter.build_invoker();
        info!(
            target: "qti_converter",
            converter = invoker.provider_name(),
            timeout_secs = cfg.converter.timeout().as_secs(),
            require_txt = cfg.upload.require_txt_extension,
            max_upload_bytes = cfg.upload.max_upload_bytes,
            "Converter configured"
        );
        Self { upload: cfg.upload.clone(), invoker }
    }
}
