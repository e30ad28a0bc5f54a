mod common;

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use common::{FailAt, FakeEnv, Log, entries, user};
use gateway_core::{
    GatewayConfig, GatewayCore, GatewayError, GatewayResult, HostPicker, LaunchMode, PickerAction, SessionState, SessionSummary,
    UserContext,
};

#[derive(Default)]
struct ScriptedPicker {
    actions: VecDeque<PickerAction>,
    notices: Vec<String>,
    seen_hosts: Vec<usize>,
}

impl ScriptedPicker {
    fn new(actions: impl IntoIterator<Item = PickerAction>) -> Self {
        Self {
            actions: actions.into_iter().collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl HostPicker for ScriptedPicker {
    async fn pick(&mut self, user: &UserContext) -> GatewayResult<PickerAction> {
        self.seen_hosts.push(user.allowed_hosts.len());
        Ok(self.actions.pop_front().unwrap_or(PickerAction::Quit))
    }

    async fn notify(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}

fn config(direct_acl_check: bool) -> Arc<GatewayConfig> {
    Arc::new(GatewayConfig {
        direct_acl_check,
        ..Default::default()
    })
}

async fn gateway(log: &Log, direct_acl_check: bool) -> (GatewayCore<FakeEnv>, Arc<Mutex<Vec<SessionSummary>>>) {
    let (user, _) = user("alice", vec!["db1", "web1"]).await;
    let finished = Arc::new(Mutex::new(Vec::new()));
    let sink = finished.clone();
    let core = GatewayCore::new(config(direct_acl_check), user, "10.0.0.9:40000".parse().unwrap(), FakeEnv::new(log))
        .with_completion(move |summary: &SessionSummary| sink.lock().unwrap().push(summary.clone()));
    (core, finished)
}

#[tokio::test]
async fn direct_mode_runs_command_on_requested_port() {
    let log = Log::default();
    let (mut core, finished) = gateway(&log, false).await;
    let mode = LaunchMode::parse(Some("host=db1 port=2222 uptime -p")).unwrap();

    let status = core.run(mode, &mut ScriptedPicker::default()).await.unwrap();

    assert_eq!(status, Some(0));
    let log = entries(&log);
    assert_eq!(log[0], "connect db1:2222");
    assert!(log.contains(&"obs:in uptime -p".to_string()));
    assert!(log.contains(&"open exec uptime -p 120x40 xterm".to_string()));
    let finished = finished.lock().unwrap();
    assert_eq!(finished.len(), 1);
    assert_eq!((finished[0].host.as_str(), finished[0].state), ("db1", SessionState::Closed));
}

#[tokio::test]
async fn direct_mode_skips_acl_unless_enabled() {
    let log = Log::default();
    let (mut core, _) = gateway(&log, false).await;
    let mode = LaunchMode::parse(Some("host=vault")).unwrap();
    core.run(mode, &mut ScriptedPicker::default()).await.unwrap();
    assert_eq!(entries(&log)[0], "connect vault:22");

    let log = Log::default();
    let (mut core, finished) = gateway(&log, true).await;
    let mode = LaunchMode::parse(Some("host=vault")).unwrap();
    let err = core.run(mode, &mut ScriptedPicker::default()).await.unwrap_err();
    assert!(matches!(err, GatewayError::HostNotAllowed { ref host, .. } if host == "vault"));
    assert_eq!(core.env().backends_built, 0);
    assert!(finished.lock().unwrap().is_empty());
}

#[tokio::test]
async fn direct_failure_surfaces_after_teardown() {
    let log = Log::default();
    let (user, _) = user("alice", vec!["db1"]).await;
    let mut env = FakeEnv::new(&log);
    env.fail_at = FailAt::Auth;
    let finished = Arc::new(Mutex::new(Vec::new()));
    let sink = finished.clone();
    let mut core = GatewayCore::new(config(false), user, "10.0.0.9:40000".parse().unwrap(), env)
        .with_completion(move |summary: &SessionSummary| sink.lock().unwrap().push(summary.clone()));
    let mode = LaunchMode::parse(Some("host=db1")).unwrap();

    let err = core.run(mode, &mut ScriptedPicker::default()).await.unwrap_err();

    assert!(matches!(err, GatewayError::Ssh(ssh_core::SshCoreError::AuthExhausted { .. })));
    assert_eq!(finished.lock().unwrap()[0].state, SessionState::Failed);
    assert_eq!(entries(&log).last().map(String::as_str), Some("close socket"));
}

#[tokio::test]
async fn interactive_mode_enforces_acl_and_loops_until_quit() {
    let log = Log::default();
    let (mut core, finished) = gateway(&log, false).await;
    let mut picker = ScriptedPicker::new([
        PickerAction::Connect("vault".into()),
        PickerAction::Connect("DB1".into()),
        PickerAction::Reload,
        PickerAction::Connect("web1".into()),
        PickerAction::Quit,
    ]);

    let status = core.run(LaunchMode::Interactive, &mut picker).await.unwrap();

    assert_eq!(status, Some(0));
    assert_eq!(picker.notices.len(), 1);
    assert!(picker.notices[0].contains("vault"));
    assert_eq!(picker.seen_hosts, vec![2, 2, 2, 2, 2]);
    let hosts: Vec<_> = finished.lock().unwrap().iter().map(|s| s.host.clone()).collect();
    assert_eq!(hosts, vec!["DB1", "web1"]);
    assert!(!entries(&log).iter().any(|entry| entry.contains("vault")));
}

#[tokio::test]
async fn interactive_session_failure_returns_to_picker() {
    let log = Log::default();
    let (user, _) = user("alice", vec!["db1"]).await;
    let mut env = FakeEnv::new(&log);
    env.fail_at = FailAt::Connect;
    let mut core = GatewayCore::new(config(false), user, "10.0.0.9:40000".parse().unwrap(), env);
    let mut picker = ScriptedPicker::new([PickerAction::Connect("db1".into()), PickerAction::Quit]);

    let status = core.run(LaunchMode::Interactive, &mut picker).await.unwrap();

    assert_eq!(status, None);
    assert_eq!(picker.seen_hosts.len(), 2);
    assert!(picker.notices[0].contains("db1"));
}

#[tokio::test]
async fn reload_bypasses_the_cache() {
    let log = Log::default();
    let (user, reloads) = user("alice", vec!["db1"]).await;
    let mut core = GatewayCore::new(config(false), user, "10.0.0.9:40000".parse().unwrap(), FakeEnv::new(&log));
    let mut picker = ScriptedPicker::new([PickerAction::Reload, PickerAction::Reload]);

    core.run(LaunchMode::Interactive, &mut picker).await.unwrap();

    assert_eq!(*reloads.lock().unwrap(), 2);
    assert!(!core.user().from_cache);
}
