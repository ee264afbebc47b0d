//! Blocking HTTP implementations of the store traits.

pub mod notion;
pub mod sheets;

use std::time::Duration;

use serde_json::Value;

use sheetsync_sync::StoreError;

pub use notion::NotionStore;
pub use sheets::SheetsStore;

fn http_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(10))
        .timeout_read(Duration::from_secs(60))
        .timeout_write(Duration::from_secs(60))
        .build()
}

/// Failure of one HTTP exchange, before it is given a store name.
#[derive(Debug)]
enum HttpError {
    Status(u16, String),
    Transport(String),
    Body(String),
}

impl HttpError {
    fn into_store(self, store: &'static str) -> StoreError {
        match self {
            HttpError::Status(code, body) => StoreError::Request {
                store,
                message: format!("HTTP {code}: {}", body.trim()),
            },
            HttpError::Transport(message) => StoreError::Request { store, message },
            HttpError::Body(message) => StoreError::Malformed { store, message },
        }
    }
}

/// Send `request`, with a JSON body when given, and decode the JSON answer.
fn send(request: ureq::Request, body: Option<&Value>) -> Result<Value, HttpError> {
    let result = match body {
        Some(body) => request.send_json(body),
        None => request.call(),
    };
    match result {
        Ok(response) => response
            .into_json::<Value>()
            .map_err(|e| HttpError::Body(e.to_string())),
        Err(ureq::Error::Status(code, response)) => Err(HttpError::Status(
            code,
            response.into_string().unwrap_or_default(),
        )),
        Err(err) => Err(HttpError::Transport(err.to_string())),
    }
}

fn malformed(store: &'static str, message: impl Into<String>) -> StoreError {
    StoreError::Malformed {
        store,
        message: message.into(),
    }
}
