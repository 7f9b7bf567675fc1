//! `telecon doctor` - active health diagnostics.
//!
//! Probes the backend and validates configuration to surface problems
//! before they bite during normal operation. Each check reports pass/fail
//! with actionable guidance on failures.

use std::sync::Arc;

use crate::api::AccountApi;
use crate::bootstrap::telecon_env_path;

/// Run diagnostic checks and print results. Returns an error in strict mode
/// when any check fails.
pub async fn run_doctor(api: Arc<dyn AccountApi>, strict: bool) -> anyhow::Result<()> {
    println!("Telecon Doctor");
    println!("==============\n");

    let mut passed = 0u32;
    let mut failed = 0u32;

    check("Bootstrap env file", check_env_file(), &mut passed, &mut failed);
    check(
        "Backend reachability",
        check_backend(&api).await,
        &mut passed,
        &mut failed,
    );
    check(
        "Console credential",
        check_credential(&api).await,
        &mut passed,
        &mut failed,
    );

    println!("\n{passed} passed, {failed} failed");
    if strict && failed > 0 {
        anyhow::bail!("{failed} doctor check(s) failed");
    }
    Ok(())
}

fn check(name: &str, result: Result<String, String>, passed: &mut u32, failed: &mut u32) {
    match result {
        Ok(detail) => {
            *passed += 1;
            println!("  ✓ {name}: {detail}");
        }
        Err(detail) => {
            *failed += 1;
            println!("  ✗ {name}: {detail}");
        }
    }
}

fn check_env_file() -> Result<String, String> {
    let path = telecon_env_path();
    if path.exists() {
        Ok(format!("{}", path.display()))
    } else {
        Err(format!(
            "{} not found; set TELECON_API_URL and TELECON_AUTH_TOKEN there or in the environment",
            path.display()
        ))
    }
}

async fn check_backend(api: &Arc<dyn AccountApi>) -> Result<String, String> {
    match api.check_connection().await {
        Ok(status) if status.proxy_connected => Ok(format!(
            "reachable, mobile proxy up{}",
            status
                .proxy_info
                .map_or(String::new(), |info| format!(" ({info})"))
        )),
        Ok(_) => Ok("reachable, no proxy (direct connection)".to_string()),
        Err(e) => Err(format!("unreachable: {e}")),
    }
}

async fn check_credential(api: &Arc<dyn AccountApi>) -> Result<String, String> {
    match api.sessions().await {
        Ok(sessions) => Ok(format!("accepted, {} stored session(s)", sessions.len())),
        Err(crate::error::ApiError::Unauthorized) => {
            Err("rejected (HTTP 401); refresh TELECON_AUTH_TOKEN".to_string())
        }
        Err(e) => Err(format!("could not verify: {e}")),
    }
}
