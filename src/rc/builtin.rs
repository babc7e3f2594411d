//! Operations every server registers
//!
//! - `rc/noop`, `rc/noopauth`: echo the input back
//! - `rc/error`: always fail
//! - `rc/list`: list registered operations
//! - `core/version`: report the server version
//! - `job/status`, `job/list`, `job/stop`: inspect and control async jobs

use serde_json::json;
use std::sync::Arc;

use crate::errors::{RcError, Result};
use crate::rc::jobs::JobQueue;
use crate::rc::registry::{CallContext, CallInfo, Registry};
use crate::rc::Params;

/// Register the built-in operations
///
/// `rc/list` snapshots the registry, so call this after any other
/// registrations.
pub fn register(registry: &mut Registry, jobs: JobQueue) {
    registry
        .add_fn("rc/noop", "Echo the input to the output parameters", false, noop)
        .add_fn(
            "rc/noopauth",
            "Echo the input to the output parameters requiring auth",
            true,
            noop,
        )
        .add_fn("rc/error", "This returns an error", false, always_error)
        .add_fn("core/version", "Shows the current version of the server", false, version);

    let status_jobs = jobs.clone();
    let list_jobs = jobs.clone();
    registry
        .add_fn("job/status", "Reads the status of the job ID", false, move |_ctx, params| {
            job_status(status_jobs.clone(), params)
        })
        .add_fn("job/list", "Lists the IDs of the running jobs", false, move |_ctx, _params| {
            job_list(list_jobs.clone())
        })
        .add_fn("job/stop", "Stop the running job", true, move |_ctx, params| {
            job_stop(jobs.clone(), params)
        });

    let mut commands = registry.list();
    commands.push(CallInfo {
        path: LIST_PATH.to_string(),
        title: LIST_TITLE.to_string(),
        help: String::new(),
        auth_required: false,
    });
    commands.sort_by(|a, b| a.path.cmp(&b.path));
    let commands = Arc::new(commands);
    registry.add_fn(LIST_PATH, LIST_TITLE, false, move |_ctx, _params| {
        list_commands(commands.clone())
    });
}

const LIST_PATH: &str = "rc/list";
const LIST_TITLE: &str = "List all the registered remote control commands";

async fn noop(_ctx: CallContext, params: Params) -> Result<Option<Params>> {
    Ok(Some(params))
}

async fn always_error(_ctx: CallContext, params: Params) -> Result<Option<Params>> {
    Err(RcError::Operation(format!(
        "arbitrary error on input {}",
        serde_json::to_string(&params)?
    )))
}

async fn version(_ctx: CallContext, _params: Params) -> Result<Option<Params>> {
    Ok(Some(
        [
            ("name", json!(env!("CARGO_PKG_NAME"))),
            ("version", json!(env!("CARGO_PKG_VERSION"))),
        ]
        .into_iter()
        .collect(),
    ))
}

async fn list_commands(commands: Arc<Vec<CallInfo>>) -> Result<Option<Params>> {
    Ok(Some(
        [("commands", serde_json::to_value(&*commands)?)]
            .into_iter()
            .collect(),
    ))
}

async fn job_status(jobs: JobQueue, params: Params) -> Result<Option<Params>> {
    let job = jobs.status(job_id(&params)?).await?;
    Ok(Some(Params::from_serialize(&job)?))
}

async fn job_list(jobs: JobQueue) -> Result<Option<Params>> {
    let ids = jobs.ids().await;
    Ok(Some([("jobids", json!(ids))].into_iter().collect()))
}

async fn job_stop(jobs: JobQueue, params: Params) -> Result<Option<Params>> {
    jobs.stop(job_id(&params)?).await?;
    Ok(None)
}

fn job_id(params: &Params) -> Result<u64> {
    let id = params.get_i64("jobid")?;
    u64::try_from(id).map_err(|_| RcError::ParamInvalid(format!("invalid jobid {}", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    async fn call(registry: &Registry, path: &str, params: Params) -> Result<Option<Params>> {
        let call = registry.get(path).unwrap();
        call.handler
            .call(CallContext::new(path, CancellationToken::new()), params)
            .await
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        register(&mut registry, JobQueue::new(None));
        registry
    }

    #[tokio::test]
    async fn test_noop_echoes() {
        let registry = registry();
        let input: Params = [("num", "5")].into_iter().collect();
        let out = call(&registry, "rc/noop", input.clone()).await.unwrap();
        assert_eq!(out, Some(input));
        assert!(registry.get("rc/noopauth").unwrap().auth_required);
    }

    #[tokio::test]
    async fn test_error_fails() {
        let registry = registry();
        let err = call(&registry, "rc/error", Params::new()).await.unwrap_err();
        assert!(err.to_string().starts_with("arbitrary error on input"));
    }

    #[tokio::test]
    async fn test_list_includes_itself() {
        let registry = registry();
        let out = call(&registry, "rc/list", Params::new()).await.unwrap().unwrap();
        let paths: Vec<&str> = out["commands"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|c| c["Path"].as_str())
            .collect();
        assert!(paths.contains(&"rc/list"));
        assert!(paths.contains(&"job/status"));

        // sorted, one entry per call, same as the registry itself
        let listed = registry.list();
        let expected: Vec<&str> = listed.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, expected);
    }

    #[tokio::test]
    async fn test_job_status_needs_jobid() {
        let registry = registry();
        let err = call(&registry, "job/status", Params::new()).await.unwrap_err();
        assert!(matches!(err, RcError::ParamNotFound(_)));

        let params: Params = [("jobid", -1)].into_iter().collect();
        let err = call(&registry, "job/status", params).await.unwrap_err();
        assert!(matches!(err, RcError::ParamInvalid(_)));
    }
}
