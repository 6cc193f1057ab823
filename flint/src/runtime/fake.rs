//! In-memory runtime for tests.
//!
//! Records every call, simulates `tar` writing an archive into read-write
//! host bindings, and lets tests inject failures at each lifecycle step.

use super::{AccessMode, BindSource, ContainerRuntime, PullEvent, PullStream, TaskSpec, Volume};
use crate::utils::errors::RuntimeError;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const PULL_LINES: &[&str] = &["latest: Pulling from library/alpine", "Pull complete", "Status: Downloaded newer image"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Ping,
    ImageExists(String),
    Pull(String),
    ListVolumes(Option<String>),
    CreateVolume(String),
    Create(String),
    Start(String),
    Wait(String),
    Remove(String),
}

#[derive(Default)]
pub struct FakeRuntime {
    volumes: Vec<Volume>,
    images: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Call>>,
    containers: Mutex<HashMap<String, TaskSpec>>,
    live: Mutex<HashSet<String>>,
    next_id: AtomicUsize,
    pulls: AtomicUsize,
    produced: Arc<AtomicUsize>,
    consumed: Arc<AtomicUsize>,
    failing_volumes: HashMap<String, i64>,
    silent_volumes: HashSet<String>,
    empty_volumes: HashSet<String>,
    lost_at_volumes: HashSet<String>,
    fail_create: bool,
    fail_start: bool,
    fail_wait: bool,
    fail_remove: bool,
    fail_pull: bool,
    fail_list: bool,
    unavailable: bool,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_volume(mut self, name: &str, labels: &[(&str, &str)]) -> Self {
        self.volumes.push(Volume {
            name: name.to_string(),
            driver: "local".to_string(),
            mountpoint: format!("/var/lib/docker/volumes/{}/_data", name),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        });
        self
    }

    pub fn with_eligible_volume(self, name: &str) -> Self {
        self.with_volume(name, &[("backup.enable", "true")])
    }

    pub fn with_image(self, reference: &str) -> Self {
        self.images.lock().unwrap().insert(reference.to_string());
        self
    }

    /// Tasks mounting `volume` exit with `code` after writing a partial archive.
    pub fn failing_volume(mut self, volume: &str, code: i64) -> Self {
        self.failing_volumes.insert(volume.to_string(), code);
        self
    }

    /// Tasks mounting `volume` exit 0 without writing anything.
    pub fn silent_volume(mut self, volume: &str) -> Self {
        self.silent_volumes.insert(volume.to_string());
        self
    }

    /// Tasks mounting `volume` exit 0 after writing an empty archive.
    pub fn empty_archive_volume(mut self, volume: &str) -> Self {
        self.empty_volumes.insert(volume.to_string());
        self
    }

    /// The runtime becomes unreachable when a task mounting `volume` is created.
    pub fn lost_at_volume(mut self, volume: &str) -> Self {
        self.lost_at_volumes.insert(volume.to_string());
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_wait(mut self) -> Self {
        self.fail_wait = true;
        self
    }

    pub fn failing_remove(mut self) -> Self {
        self.fail_remove = true;
        self
    }

    pub fn failing_pull(mut self) -> Self {
        self.fail_pull = true;
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Specs of every container created, in creation order.
    pub fn specs(&self) -> Vec<TaskSpec> {
        let containers = self.containers.lock().unwrap();
        let mut ids: Vec<_> = containers.keys().cloned().collect();
        ids.sort_by_key(|id| id.trim_start_matches("fake-").parse::<usize>().unwrap_or(0));
        ids.iter().map(|id| containers[id].clone()).collect()
    }

    /// Containers created and not yet removed.
    pub fn live_containers(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    /// True when any call other than read-only queries reached the runtime.
    pub fn mutated(&self) -> bool {
        self.calls().iter().any(|c| {
            matches!(
                c,
                Call::Pull(_) | Call::CreateVolume(_) | Call::Create(_) | Call::Start(_) | Call::Remove(_)
            )
        })
    }

    pub fn pull_count(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    pub fn pull_events_produced(&self) -> usize {
        self.produced.load(Ordering::SeqCst)
    }

    pub fn pull_events_consumed(&self) -> usize {
        self.consumed.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_available(&self) -> Result<(), RuntimeError> {
        if self.unavailable {
            Err(RuntimeError::Unavailable("fake runtime is down".to_string()))
        } else {
            Ok(())
        }
    }

    fn failure(op: &str) -> RuntimeError {
        RuntimeError::Command {
            op: op.to_string(),
            code: Some(1),
            stderr: format!("injected {} failure", op),
        }
    }

    /// Write `contents` wherever the command names a file under a read-write host mount.
    fn simulate_writes(spec: &TaskSpec, contents: &[u8]) {
        for binding in &spec.bindings {
            let BindSource::HostPath(host) = &binding.source else {
                continue;
            };
            if binding.mode != AccessMode::ReadWrite {
                continue;
            }
            let prefix = format!("{}/", binding.target);
            for arg in &spec.command {
                if let Some(rel) = arg.strip_prefix(&prefix) {
                    std::fs::write(host.join(rel), contents).unwrap();
                }
            }
        }
    }

    fn volumes_of(spec: &TaskSpec) -> impl Iterator<Item = &str> {
        spec.bindings.iter().filter_map(|b| match &b.source {
            BindSource::Volume(name) => Some(name.as_str()),
            BindSource::HostPath(_) => None,
        })
    }

    fn failing_code(&self, spec: &TaskSpec) -> Option<i64> {
        Self::volumes_of(spec).find_map(|name| self.failing_volumes.get(name).copied())
    }

    fn mounts_any(spec: &TaskSpec, set: &HashSet<String>) -> bool {
        Self::volumes_of(spec).any(|name| set.contains(name))
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.record(Call::Ping);
        self.check_available()
    }

    async fn image_exists(&self, reference: &str) -> Result<bool, RuntimeError> {
        self.record(Call::ImageExists(reference.to_string()));
        self.check_available()?;
        Ok(self.images.lock().unwrap().contains(reference))
    }

    async fn pull_image(&self, reference: &str) -> Result<PullStream, RuntimeError> {
        self.record(Call::Pull(reference.to_string()));
        self.check_available()?;
        self.pulls.fetch_add(1, Ordering::SeqCst);

        let mut events: Vec<Result<PullEvent, RuntimeError>> = PULL_LINES
            .iter()
            .map(|line| Ok(PullEvent { status: line.to_string() }))
            .collect();
        if self.fail_pull {
            events.truncate(1);
            events.push(Err(Self::failure("pull")));
        } else {
            self.images.lock().unwrap().insert(reference.to_string());
        }
        self.produced.fetch_add(events.len(), Ordering::SeqCst);

        let consumed = Arc::clone(&self.consumed);
        Ok(stream::iter(events)
            .inspect(move |_| {
                consumed.fetch_add(1, Ordering::SeqCst);
            })
            .boxed())
    }

    async fn list_volumes(&self, label: Option<&str>) -> Result<Vec<Volume>, RuntimeError> {
        self.record(Call::ListVolumes(label.map(str::to_string)));
        self.check_available()?;
        if self.fail_list {
            return Err(Self::failure("volume ls"));
        }
        Ok(self
            .volumes
            .iter()
            .filter(|v| label.map_or(true, |l| v.matches_label(l)))
            .cloned()
            .collect())
    }

    async fn create_volume(&self, name: &str) -> Result<(), RuntimeError> {
        self.record(Call::CreateVolume(name.to_string()));
        self.check_available()
    }

    async fn create_container(&self, spec: &TaskSpec) -> Result<String, RuntimeError> {
        self.check_available()?;
        if Self::mounts_any(spec, &self.lost_at_volumes) {
            return Err(RuntimeError::Unavailable("fake runtime went away".to_string()));
        }
        if self.fail_create {
            return Err(Self::failure("create"));
        }
        let id = format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.record(Call::Create(id.clone()));
        self.containers.lock().unwrap().insert(id.clone(), spec.clone());
        self.live.lock().unwrap().insert(id.clone());
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.record(Call::Start(id.to_string()));
        if self.fail_start {
            return Err(Self::failure("start"));
        }
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64, RuntimeError> {
        self.record(Call::Wait(id.to_string()));
        if self.fail_wait {
            return Err(Self::failure("wait"));
        }
        let spec = self
            .containers
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| Self::failure("wait"))?;

        if Self::mounts_any(&spec, &self.silent_volumes) {
            return Ok(0);
        }
        if Self::mounts_any(&spec, &self.empty_volumes) {
            Self::simulate_writes(&spec, b"");
            return Ok(0);
        }

        match self.failing_code(&spec) {
            Some(code) => {
                Self::simulate_writes(&spec, b"partial");
                Ok(code)
            }
            None => {
                Self::simulate_writes(&spec, b"fake gzip archive contents");
                Ok(0)
            }
        }
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.record(Call::Remove(id.to_string()));
        if self.fail_remove {
            return Err(Self::failure("rm"));
        }
        self.live.lock().unwrap().remove(id);
        Ok(())
    }
}
