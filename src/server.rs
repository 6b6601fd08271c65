//! The webhook server. The form and the spreadsheet forward their events here as JSON.
//!
//! - `POST /form-submit` takes a `FormSubmission` and records it.
//! - `POST /cell-edit` takes a `CellEdit` and refreshes the form choices it touches.
//!
//! When a token is configured, every request must carry it in the `x-ledger-token` header.

use crate::api::{self, Workbook};
use crate::model::{CellEdit, FormSubmission};
use crate::{options, recorder, Config, Mode, Result};
use anyhow::Context;
use http_body_util::{BodyExt, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub(crate) const TOKEN_HEADER: &str = "x-ledger-token";
const FORM_SUBMIT: &str = "/form-submit";
const CELL_EDIT: &str = "/cell-edit";
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Listens on `port` until the process is interrupted.
pub(crate) async fn serve(config: Config, mode: Mode, port: u16) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Unable to listen on port {port}"))?;
    info!(
        "Listening for form submissions and cell edits on {}",
        listener.local_addr()?
    );
    if config.webhook().token.is_none() {
        warn!("No webhook token is configured, requests are not authenticated");
    }
    run(listener, Handler::new(config, mode), shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to wait for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

/// Serves connections from `listener` until `shutdown` completes.
async fn run(
    listener: TcpListener,
    handler: Handler,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Unable to accept a connection: {e}");
                        continue;
                    }
                };
                debug!("Connection from {peer}");
                let handler = handler.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let handler = handler.clone();
                        async move { handler.call(req).await }
                    });
                    if let Err(e) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        warn!("Connection from {peer} failed: {e}");
                    }
                });
            }
            _ = &mut shutdown => {
                info!("Shutting down the webhook server");
                return Ok(());
            }
        }
    }
}

/// The JSON body of every response.
#[derive(Debug, Serialize)]
struct Reply<T: Serialize> {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<T>,
}

#[derive(Clone)]
struct Handler {
    config: Arc<Config>,
    mode: Mode,
}

impl Handler {
    fn new(config: Config, mode: Mode) -> Self {
        Self {
            config: Arc::new(config),
            mode,
        }
    }

    async fn call(
        &self,
        req: Request<Incoming>,
    ) -> std::result::Result<Response<String>, Infallible> {
        let span = info_span!("request", id = %Uuid::new_v4(), path = %req.uri().path());
        async move {
            let method = req.method().clone();
            let path = req.uri().path().to_string();
            let token = req
                .headers()
                .get(TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    let reply = message(StatusCode::BAD_REQUEST, format!("Unreadable body: {e}"));
                    return Ok(reply);
                }
            };
            let response = self.respond(&method, &path, token.as_deref(), &body).await;
            info!("{method} {path} -> {}", response.status());
            Ok(response)
        }
        .instrument(span)
        .await
    }

    async fn respond(
        &self,
        method: &Method,
        path: &str,
        token: Option<&str>,
        body: &[u8],
    ) -> Response<String> {
        if path != FORM_SUBMIT && path != CELL_EDIT {
            return message(StatusCode::NOT_FOUND, format!("No such endpoint '{path}'"));
        }
        if method != Method::POST {
            return message(StatusCode::METHOD_NOT_ALLOWED, "Only POST is accepted");
        }
        if let Some(expected) = self.config.webhook().token.as_deref() {
            if token != Some(expected) {
                return message(StatusCode::UNAUTHORIZED, "Missing or wrong token");
            }
        }

        if path == FORM_SUBMIT {
            let submission: FormSubmission = match serde_json::from_slice(body) {
                Ok(submission) => submission,
                Err(e) => return message(StatusCode::BAD_REQUEST, format!("Bad submission: {e}")),
            };
            match self.record(&submission).await {
                Ok(report) => reply(StatusCode::OK, report.message(), report),
                Err(e) => failure(e),
            }
        } else {
            let edit: CellEdit = match serde_json::from_slice(body) {
                Ok(edit) => edit,
                Err(e) => return message(StatusCode::BAD_REQUEST, format!("Bad cell edit: {e}")),
            };
            match self.sync(&edit).await {
                Ok(report) => reply(StatusCode::OK, report.message(), report),
                Err(e) => failure(e),
            }
        }
    }

    async fn record(&self, submission: &FormSubmission) -> Result<recorder::RecordReport> {
        let mut workbook = Workbook::new(api::sheet(&self.config, self.mode).await?);
        recorder::record(&self.config, &mut workbook, submission).await
    }

    async fn sync(&self, edit: &CellEdit) -> Result<options::SyncReport> {
        let mut workbook = Workbook::new(api::sheet(&self.config, self.mode).await?);
        let mut form = api::form(&self.config, self.mode).await?;
        options::sync_edit(&self.config, &mut workbook, form.as_mut(), &edit.range).await
    }
}

fn failure(e: anyhow::Error) -> Response<String> {
    error!("The request failed: {e:#}");
    message(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
}

fn message(status: StatusCode, message: impl Into<String>) -> Response<String> {
    reply::<()>(status, message, None)
}

fn reply<T: Serialize>(
    status: StatusCode,
    message: impl Into<String>,
    report: impl Into<Option<T>>,
) -> Response<String> {
    let reply = Reply {
        message: message.into(),
        report: report.into(),
    };
    let body = serde_json::to_string(&reply)
        .unwrap_or_else(|e| format!(r#"{{"message":"Unable to serialize the reply: {e}"}}"#));
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}
