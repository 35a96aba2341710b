// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request types for the API.

use serde::Deserialize;

/// Query options for validation requests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidateOptions {
    /// Skip cache lookup if true.
    #[serde(default)]
    pub skip_cache: bool,
}
