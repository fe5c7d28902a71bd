//! Recording fakes of both gateways and a harness around a temp state dir

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use lakelab_common::catalog::default_essentials;
use lakelab_common::config::Timeouts;
use lakelab_common::{Error, LabConfig, LabState, Outputs, Result, StateStore};
use lakelab_gateway::{
    ClusterStatus, DatabaseStatus, DeploymentGateway, InstallRequest, ModuleRun, NodeReadiness,
    PlanSummary, PodState, ProvisionerGateway, ReleaseInfo,
};

use crate::confirm::Confirmer;
use crate::orchestrator::{BootstrapOptions, PhaseOrchestrator};

fn outputs(pairs: &[(&str, &str)]) -> Outputs {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn is_mutating(call: &str) -> bool {
    ["apply:", "destroy:", "install:", "uninstall:", "create_namespace:", "delete_namespace:", "apply_secret:"]
        .iter()
        .any(|prefix| call.starts_with(prefix))
}

/// Provisioner that records calls and returns canned outputs
pub(crate) struct FakeProvisioner {
    calls: Mutex<Vec<String>>,
    runs: Mutex<Vec<ModuleRun>>,
    outputs: Mutex<HashMap<String, Outputs>>,
    failing: Mutex<HashSet<String>>,
    locked: Mutex<HashSet<String>>,
    statuses: Mutex<VecDeque<ClusterStatus>>,
    inspection_fails: Mutex<bool>,
    database: Mutex<Option<DatabaseStatus>>,
}

impl FakeProvisioner {
    fn new() -> Self {
        let mut modules = HashMap::new();
        modules.insert(
            "state-backend".to_string(),
            outputs(&[("state_bucket", "demo-tfstate"), ("lock_table", "demo-locks")]),
        );
        modules.insert(
            "foundation".to_string(),
            outputs(&[
                ("bucket_name", "demo-lake"),
                ("db_instance_id", "demo-db"),
                ("vpc_id", "vpc-0abc"),
                ("db_credentials_secret_arn", "arn:aws:secretsmanager:us-east-1:1:secret:demo-db"),
            ]),
        );
        modules.insert("cluster".to_string(), outputs(&[("cluster_name", "demo-eks")]));

        Self {
            calls: Mutex::new(Vec::new()),
            runs: Mutex::new(Vec::new()),
            outputs: Mutex::new(modules),
            failing: Mutex::new(HashSet::new()),
            locked: Mutex::new(HashSet::new()),
            statuses: Mutex::new(VecDeque::new()),
            inspection_fails: Mutex::new(false),
            database: Mutex::new(Some(DatabaseStatus::Available)),
        }
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn mutating_calls(&self) -> Vec<String> {
        self.calls().into_iter().filter(|c| is_mutating(c)).collect()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
        self.runs.lock().unwrap().clear();
    }

    pub(crate) fn runs(&self) -> Vec<ModuleRun> {
        self.runs.lock().unwrap().clone()
    }

    /// `apply:<module>` and `destroy:<module>` fail
    pub(crate) fn fail_apply(&self, module: &str) {
        self.failing.lock().unwrap().insert(format!("apply:{}", module));
    }

    pub(crate) fn fail_destroy(&self, module: &str) {
        self.failing.lock().unwrap().insert(format!("destroy:{}", module));
    }

    pub(crate) fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
        self.locked.lock().unwrap().clear();
        *self.inspection_fails.lock().unwrap() = false;
    }

    pub(crate) fn lock_module(&self, module: &str) {
        self.locked.lock().unwrap().insert(module.to_string());
    }

    /// Statuses returned in order; the last one repeats
    pub(crate) fn cluster_statuses(&self, statuses: &[ClusterStatus]) {
        *self.statuses.lock().unwrap() = statuses.iter().cloned().collect();
    }

    pub(crate) fn fail_inspection(&self) {
        *self.inspection_fails.lock().unwrap() = true;
    }

    pub(crate) fn set_database_status(&self, status: Option<DatabaseStatus>) {
        *self.database.lock().unwrap() = status;
    }

    pub(crate) fn without_output(&self, module: &str, key: &str) {
        if let Some(outputs) = self.outputs.lock().unwrap().get_mut(module) {
            outputs.remove(key);
        }
    }

    fn module_outputs(&self, module: &str) -> Outputs {
        self.outputs
            .lock()
            .unwrap()
            .get(module)
            .cloned()
            .unwrap_or_default()
    }

    fn check(&self, operation: &str, module: &str) -> Result<()> {
        if self.locked.lock().unwrap().contains(module) {
            return Err(Error::StateLocked {
                module: module.to_string(),
                message: "lock held by another run".to_string(),
            });
        }
        if self
            .failing
            .lock()
            .unwrap()
            .contains(&format!("{}:{}", operation, module))
        {
            return Err(Error::provisioner(module, operation, "injected failure"));
        }
        Ok(())
    }

    fn inspect(&self, call: &str) -> Result<()> {
        self.record(call);
        if *self.inspection_fails.lock().unwrap() {
            return Err(Error::provisioner("inspect", call, "credentials expired"));
        }
        Ok(())
    }
}

#[async_trait]
impl ProvisionerGateway for FakeProvisioner {
    async fn preflight(&self) -> Result<()> {
        self.record("preflight");
        Ok(())
    }

    async fn plan(&self, run: &ModuleRun) -> Result<PlanSummary> {
        self.record(format!("plan:{}", run.name));
        self.runs.lock().unwrap().push(run.clone());
        Ok(PlanSummary {
            add: 3,
            ..Default::default()
        })
    }

    async fn apply(&self, run: &ModuleRun) -> Result<Outputs> {
        self.record(format!("apply:{}", run.name));
        self.runs.lock().unwrap().push(run.clone());
        self.check("apply", &run.name)?;
        Ok(self.module_outputs(&run.name))
    }

    async fn destroy(&self, run: &ModuleRun) -> Result<()> {
        self.record(format!("destroy:{}", run.name));
        self.runs.lock().unwrap().push(run.clone());
        self.check("destroy", &run.name)
    }

    async fn output(&self, run: &ModuleRun) -> Result<Outputs> {
        self.record(format!("output:{}", run.name));
        Ok(self.module_outputs(&run.name))
    }

    async fn cluster_status(&self, _name: &str) -> Result<ClusterStatus> {
        self.inspect("cluster_status")?;
        let mut statuses = self.statuses.lock().unwrap();
        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        Ok(status.unwrap_or(ClusterStatus::Active))
    }

    async fn object_store_exists(&self, _name: &str) -> Result<bool> {
        self.inspect("bucket_exists")?;
        Ok(true)
    }

    async fn database_status(&self, _id: &str) -> Result<Option<DatabaseStatus>> {
        self.inspect("database_status")?;
        Ok(self.database.lock().unwrap().clone())
    }

    async fn read_secret(&self, _reference: &str) -> Result<BTreeMap<String, String>> {
        self.record("read_secret");
        Ok(outputs(&[("username", "lake"), ("password", "hunter2")]))
    }

    async fn write_kubeconfig(&self, cluster: &str, path: &Path) -> Result<()> {
        self.record("write_kubeconfig");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, format!("current-context: {}\n", cluster))?;
        Ok(())
    }
}

/// Deployment executor that records calls and tracks releases in memory
pub(crate) struct FakeDeployer {
    calls: Mutex<Vec<String>>,
    releases: Mutex<BTreeMap<String, String>>,
    namespaces: Mutex<BTreeSet<String>>,
    secrets: Mutex<HashMap<String, BTreeMap<String, String>>>,
    failing_installs: Mutex<HashSet<String>>,
    failing_uninstalls: Mutex<HashSet<String>>,
    unhealthy: Mutex<HashSet<String>>,
    nodes: Mutex<NodeReadiness>,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    essentials: BTreeSet<String>,
}

impl FakeDeployer {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            releases: Mutex::new(BTreeMap::new()),
            namespaces: Mutex::new(BTreeSet::new()),
            secrets: Mutex::new(HashMap::new()),
            failing_installs: Mutex::new(HashSet::new()),
            failing_uninstalls: Mutex::new(HashSet::new()),
            unhealthy: Mutex::new(HashSet::new()),
            nodes: Mutex::new(NodeReadiness { ready: 2, total: 2 }),
            latency: Mutex::new(Duration::ZERO),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            essentials: default_essentials().into_iter().map(|e| e.name).collect(),
        }
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn mutating_calls(&self) -> Vec<String> {
        self.calls().into_iter().filter(|c| is_mutating(c)).collect()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
        self.max_in_flight.store(0, Ordering::SeqCst);
    }

    fn released(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|c| c.strip_prefix(prefix))
            .map(str::to_string)
            .collect()
    }

    /// Release names installed, essentials included
    pub(crate) fn installs(&self) -> Vec<String> {
        self.released("install:")
    }

    /// Release names installed, essentials excluded
    pub(crate) fn component_installs(&self) -> Vec<String> {
        self.installs()
            .into_iter()
            .filter(|r| !self.essentials.contains(r))
            .collect()
    }

    pub(crate) fn uninstalls(&self) -> Vec<String> {
        self.released("uninstall:")
    }

    pub(crate) fn fail_install(&self, release: &str) {
        self.failing_installs.lock().unwrap().insert(release.to_string());
    }

    pub(crate) fn fail_uninstall(&self, release: &str) {
        self.failing_uninstalls.lock().unwrap().insert(release.to_string());
    }

    pub(crate) fn clear_failures(&self) {
        self.failing_installs.lock().unwrap().clear();
        self.failing_uninstalls.lock().unwrap().clear();
        self.unhealthy.lock().unwrap().clear();
    }

    pub(crate) fn unhealthy_pods(&self, namespace: &str) {
        self.unhealthy.lock().unwrap().insert(namespace.to_string());
    }

    pub(crate) fn set_nodes(&self, ready: usize, total: usize) {
        *self.nodes.lock().unwrap() = NodeReadiness { ready, total };
    }

    pub(crate) fn set_latency_ms(&self, ms: u64) {
        *self.latency.lock().unwrap() = Duration::from_millis(ms);
    }

    /// Highest number of installs or uninstalls observed in flight at once
    pub(crate) fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Drop a release behind the orchestrator's back
    pub(crate) fn forget_release(&self, release: &str) {
        self.releases.lock().unwrap().remove(release);
    }

    pub(crate) fn secret(&self, namespace: &str, name: &str) -> Option<BTreeMap<String, String>> {
        self.secrets
            .lock()
            .unwrap()
            .get(&format!("{}/{}", namespace, name))
            .cloned()
    }

    async fn in_flight<T>(&self, f: impl FnOnce() -> T) -> T {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let out = f();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        out
    }
}

#[async_trait]
impl DeploymentGateway for FakeDeployer {
    async fn preflight(&self) -> Result<()> {
        self.record("preflight");
        Ok(())
    }

    async fn install(&self, req: &InstallRequest) -> Result<()> {
        self.record(format!("install:{}", req.release));
        self.in_flight(|| {
            if self.failing_installs.lock().unwrap().contains(&req.release) {
                return Err(Error::deployment_for(&req.release, "injected install failure"));
            }
            self.releases
                .lock()
                .unwrap()
                .insert(req.release.clone(), req.namespace.clone());
            self.namespaces.lock().unwrap().insert(req.namespace.clone());
            Ok(())
        })
        .await
    }

    async fn uninstall(&self, release: &str, _namespace: &str) -> Result<()> {
        self.record(format!("uninstall:{}", release));
        self.in_flight(|| {
            if self.failing_uninstalls.lock().unwrap().contains(release) {
                return Err(Error::deployment_for(release, "injected uninstall failure"));
            }
            self.releases.lock().unwrap().remove(release);
            Ok(())
        })
        .await
    }

    async fn release_status(&self, release: &str, _namespace: &str) -> Result<Option<String>> {
        Ok(self
            .releases
            .lock()
            .unwrap()
            .contains_key(release)
            .then(|| "deployed".to_string()))
    }

    async fn list_releases(&self) -> Result<Vec<ReleaseInfo>> {
        self.record("list_releases");
        Ok(self
            .releases
            .lock()
            .unwrap()
            .iter()
            .map(|(name, namespace)| ReleaseInfo {
                name: name.clone(),
                namespace: namespace.clone(),
                status: "deployed".to_string(),
                chart: format!("{}-1.0.0", name),
            })
            .collect())
    }

    async fn create_namespace(&self, name: &str) -> Result<()> {
        self.record(format!("create_namespace:{}", name));
        self.namespaces.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        self.record(format!("delete_namespace:{}", name));
        self.namespaces.lock().unwrap().remove(name);
        Ok(())
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool> {
        Ok(self.namespaces.lock().unwrap().contains(name))
    }

    async fn apply_secret(
        &self,
        namespace: &str,
        name: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.record(format!("apply_secret:{}/{}", namespace, name));
        self.secrets
            .lock()
            .unwrap()
            .insert(format!("{}/{}", namespace, name), data.clone());
        Ok(())
    }

    async fn pod_states(&self, namespace: &str) -> Result<Vec<PodState>> {
        let healthy = !self.unhealthy.lock().unwrap().contains(namespace);
        Ok(vec![PodState {
            name: format!("{}-0", namespace),
            phase: if healthy { "Running" } else { "Pending" }.to_string(),
            ready: healthy,
        }])
    }

    async fn node_readiness(&self) -> Result<NodeReadiness> {
        Ok(*self.nodes.lock().unwrap())
    }
}

/// Scripted operator answers
pub(crate) struct FakeConfirmer {
    answer: Mutex<bool>,
    typed: Mutex<Option<String>>,
}

impl FakeConfirmer {
    fn new() -> Self {
        Self {
            answer: Mutex::new(true),
            typed: Mutex::new(None),
        }
    }

    pub(crate) fn answer(&self, yes: bool) {
        *self.answer.lock().unwrap() = yes;
    }

    /// What the operator types at a typed confirmation; defaults to the expected text
    pub(crate) fn type_name(&self, name: &str) {
        *self.typed.lock().unwrap() = Some(name.to_string());
    }
}

impl Confirmer for FakeConfirmer {
    fn confirm(&self, _prompt: &str) -> Result<bool> {
        Ok(*self.answer.lock().unwrap())
    }

    fn confirm_typed(&self, _prompt: &str, expected: &str) -> Result<bool> {
        let typed = self.typed.lock().unwrap().clone();
        Ok(typed.as_deref().unwrap_or(expected) == expected)
    }
}

/// Orchestrator wiring over the fakes and a temporary state directory
pub(crate) struct Harness {
    _dir: tempfile::TempDir,
    state_dir: PathBuf,
    config: LabConfig,
    pub(crate) provisioner: Arc<FakeProvisioner>,
    pub(crate) deployer: Arc<FakeDeployer>,
    pub(crate) confirmer: Arc<FakeConfirmer>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");

        let mut config = LabConfig::new("demo");
        config.state_dir = Some(state_dir.clone());
        config.timeouts = Timeouts {
            cluster_active_secs: 5,
            node_ready_secs: 0,
            component_ready_secs: 0,
            namespace_drain_secs: 0,
            poll_interval_secs: 0,
            install_timeout_secs: 60,
        };

        Self {
            _dir: dir,
            state_dir,
            config,
            provisioner: Arc::new(FakeProvisioner::new()),
            deployer: Arc::new(FakeDeployer::new()),
            confirmer: Arc::new(FakeConfirmer::new()),
        }
    }

    /// A harness whose lab has a state backend and foundation
    pub(crate) async fn bootstrapped() -> Self {
        let h = Self::new();
        h.bootstrap().await;
        h
    }

    pub(crate) async fn bootstrap(&self) {
        self.orchestrator()
            .bootstrap(&BootstrapOptions::default())
            .await
            .unwrap();
    }

    /// Fresh orchestrator over the same fakes and state directory
    pub(crate) fn orchestrator(&self) -> PhaseOrchestrator {
        PhaseOrchestrator::new(
            self.config.clone(),
            self.provisioner.clone(),
            self.deployer.clone(),
            self.confirmer.clone(),
        )
        .unwrap()
    }

    fn store(&self) -> StateStore {
        StateStore::new(&self.state_dir)
    }

    pub(crate) fn state(&self) -> LabState {
        self.store().load("demo").unwrap()
    }

    pub(crate) fn save_state(&self, state: &mut LabState) {
        self.store().save(state).unwrap();
    }

    pub(crate) fn state_file(&self) -> String {
        std::fs::read_to_string(self.store().path_for("demo")).unwrap()
    }

    pub(crate) fn state_file_exists(&self) -> bool {
        self.store().path_for("demo").exists()
    }

    pub(crate) fn kubeconfig_path(&self) -> PathBuf {
        self.config.kubeconfig_path().unwrap()
    }
}
