//! Request and response shapes for the HTTP API.

pub mod pings;

use serde::{Deserialize, Serialize};

/// How a client should present the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseType {
    Success,
    Info,
    Error,
}

/// Envelope wrapping every JSON response, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(rename = "type")]
    pub kind: ResponseType,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(title: impl Into<String>, message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            kind: ResponseType::Success,
            title: title.into(),
            message: Some(message.into()),
            data: Some(data),
        }
    }

    /// A request that worked but had nothing to do, or whose subject is unhealthy.
    pub fn info(title: impl Into<String>, message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            success: true,
            kind: ResponseType::Info,
            title: title.into(),
            message: Some(message.into()),
            data,
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            kind: ResponseType::Error,
            title: title.into(),
            message: Some(message.into()),
            data: None,
        }
    }
}
