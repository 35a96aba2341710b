// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for specification loading
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading specifications.
///
/// Evaluation itself never fails: missing data is a `Fail` verdict.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Specification document error: {0}")]
    Document(#[from] serde_json::Error),

    #[error("Invalid specification '{name}': {reason}")]
    InvalidSpecification { name: String, reason: String },
}
