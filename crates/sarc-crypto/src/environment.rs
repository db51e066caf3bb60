//! Distribution-channel probes based on the app's receipt location.

use std::path::Path;

/// File name of the receipt issued to TestFlight and sandbox builds.
pub const SANDBOX_RECEIPT_NAME: &str = "sandboxReceipt";

/// True when the app receipt lives at a sandbox path, which is how
/// TestFlight builds are told apart from App Store builds.
pub fn is_running_in_testflight_environment(receipt_path: Option<&Path>) -> bool {
    receipt_path
        .and_then(Path::file_name)
        .is_some_and(|name| name == SANDBOX_RECEIPT_NAME)
}

/// True when a receipt file is present at `receipt_path`.
pub fn receipt_exists(receipt_path: Option<&Path>) -> bool {
    receipt_path.is_some_and(Path::is_file)
}
