// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::utils::tls;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Bad request: {}", message))]
    BadRequest { message: String },

    #[snafu(display("JSON serialization error: {}", source))]
    Json { source: serde_json::Error },

    #[snafu(display("admission patch error: {}", source))]
    Patch {
        source: kube::core::admission::SerializePatchError,
    },

    #[snafu(display("invalid listen address '{}': {}", address, source))]
    Address {
        address: String,
        source: std::net::AddrParseError,
    },

    #[snafu(display("webhook tls error: {}", source))]
    Tls { source: tls::Error },

    #[snafu(display("webhook server error: {}", source))]
    Serve { source: std::io::Error },
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::BadRequest { .. } => (StatusCode::BAD_REQUEST, "BadRequest"),
            Error::Json { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "JsonError"),
            Error::Patch { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "PatchError"),
            Error::Address { .. } | Error::Tls { .. } | Error::Serve { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "ServerError")
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
