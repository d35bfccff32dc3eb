//! Sample caller: ask for one user's runs and total their distance.

use std::fmt;

use crate::schema::{RunList, RunRequest, User};
use crate::{log_info, Result, RpcClient};

/// What the driver reports for one user.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub user: String,
    pub runs: usize,
    pub total_distance_meters: f64,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ran {} meters in total ({} runs)",
            self.user, self.total_distance_meters, self.runs
        )
    }
}

/// The user the `runs_total` binary asks about.
pub fn sample_user() -> User {
    User::new("Dennis", 1)
}

/// Request `user`'s runs through `client` and sum their distances.
///
/// Errors from the client are returned unchanged.
pub async fn report_runs(client: &RpcClient, user: &User) -> Result<RunReport> {
    // ---
    let request = RunRequest::for_user(user.to_ref());

    log_info!(" [>] Send request for user {}", user.name_or_alias);
    let response: RunList = client.send_request(&request).await?;
    log_info!(" [<] Received data for {} runs", response.len());

    let report = RunReport {
        user: user.name_or_alias.clone(),
        runs: response.len(),
        total_distance_meters: response.total_distance_meters(),
    };
    log_info!(" [-] {report}");

    Ok(report)
}
