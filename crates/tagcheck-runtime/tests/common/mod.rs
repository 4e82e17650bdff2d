//! In-memory container engine and stubs shared by the integration tests.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used, missing_docs)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use tagcheck_common::error::{HarnessError, Result};
use tagcheck_runtime::backend::{
    ContainerAttributes, ContainerHandle, ContainerRuntime, ContainerSpec, ExecOutput,
};

pub const READY_LOG: &str = "[custom-init] No custom files found\n[ls.io-init] done.\n";
pub const BOOTING_LOG: &str = "[migrations] started\n";

/// How `exec` behaves inside a fake container.
#[derive(Debug, Clone)]
pub enum ExecBehavior {
    /// The command runs and prints `stdout`.
    Output { exit_code: i32, stdout: Vec<u8> },
    /// The command cannot run at all.
    Missing,
}

/// Behaviour of every container started from one image reference.
#[derive(Debug, Clone)]
pub struct FakeImage {
    pub logs: String,
    pub labels: BTreeMap<String, String>,
    pub ip: Option<String>,
    pub exec: ExecBehavior,
    pub fail_start: bool,
}

impl FakeImage {
    /// A well-behaved image: ready at once, labelled, with packages.
    pub fn healthy(version: &str) -> Self {
        Self {
            logs: READY_LOG.to_string(),
            labels: BTreeMap::from([("build_version".to_string(), version.to_string())]),
            ip: Some("172.17.0.2".to_string()),
            exec: ExecBehavior::Output {
                exit_code: 0,
                stdout: b"musl-1.2.4-r2\nbusybox-1.36.1-r5\n".to_vec(),
            },
            fail_start: false,
        }
    }

    pub fn never_ready(mut self) -> Self {
        self.logs = BOOTING_LOG.to_string();
        self
    }

    pub fn without_label(mut self) -> Self {
        self.labels.clear();
        self
    }

    pub fn with_exec(mut self, exec: ExecBehavior) -> Self {
        self.exec = exec;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn with_ip(mut self, ip: Option<&str>) -> Self {
        self.ip = ip.map(str::to_string);
        self
    }
}

#[derive(Debug, Default)]
struct State {
    next_id: u32,
    live: HashMap<String, String>,
    started: Vec<ContainerSpec>,
    started_ids: Vec<String>,
    removals: Vec<String>,
    execs: Vec<(String, Vec<String>)>,
}

/// Container engine that keeps everything in memory.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    images: HashMap<String, FakeImage>,
    state: Mutex<State>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(mut self, reference: &str, image: FakeImage) -> Self {
        let _ = self.images.insert(reference.to_string(), image);
        self
    }

    fn image_of(&self, handle: &ContainerHandle) -> Result<FakeImage> {
        let state = self.state.lock().unwrap();
        let reference = state.live.get(handle.id()).ok_or_else(|| HarnessError::NotFound {
            kind: "container",
            id: handle.id().to_string(),
        })?;
        Ok(self.images[reference].clone())
    }

    /// Specs of every container started, in order.
    pub fn started(&self) -> Vec<ContainerSpec> {
        self.state.lock().unwrap().started.clone()
    }

    /// Ids of every container started, in order.
    pub fn started_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().started_ids.clone()
    }

    /// Ids passed to `remove`, in order, including repeats.
    pub fn removals(&self) -> Vec<String> {
        self.state.lock().unwrap().removals.clone()
    }

    /// Commands executed, with the container id they ran in.
    pub fn execs(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().execs.clone()
    }

    /// Containers started but not removed yet.
    pub fn live_count(&self) -> usize {
        self.state.lock().unwrap().live.len()
    }

    /// Every started container was removed exactly once.
    pub fn assert_each_removed_once(&self) {
        let started = self.started_ids();
        let removals = self.removals();
        for id in &started {
            let count = removals.iter().filter(|r| *r == id).count();
            assert_eq!(count, 1, "container {id} removed {count} times");
        }
        assert_eq!(self.live_count(), 0, "containers left running");
    }
}

impl ContainerRuntime for FakeRuntime {
    fn start(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        let image = self
            .images
            .get(&spec.image)
            .ok_or_else(|| HarnessError::ImageNotFound {
                image: spec.image.clone(),
            })?;
        if image.fail_start {
            return Err(HarnessError::Engine {
                operation: "run",
                message: "port is already allocated".into(),
            });
        }
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("{:064x}", state.next_id);
        let _ = state.live.insert(id.clone(), spec.image.clone());
        state.started.push(spec.clone());
        state.started_ids.push(id.clone());
        Ok(ContainerHandle::new(id, spec.name.clone()))
    }

    fn logs(&self, handle: &ContainerHandle) -> Result<String> {
        Ok(self.image_of(handle)?.logs)
    }

    fn exec(&self, handle: &ContainerHandle, command: &[String]) -> Result<ExecOutput> {
        let image = self.image_of(handle)?;
        self.state
            .lock()
            .unwrap()
            .execs
            .push((handle.id().to_string(), command.to_vec()));
        match image.exec {
            ExecBehavior::Output { exit_code, stdout } => Ok(ExecOutput {
                exit_code,
                stdout,
                stderr: String::new(),
            }),
            ExecBehavior::Missing => Err(HarnessError::ExecFailed {
                command: command.join(" "),
                message: "executable file not found in $PATH".into(),
            }),
        }
    }

    fn attributes(&self, handle: &ContainerHandle) -> Result<ContainerAttributes> {
        let image = self.image_of(handle)?;
        let mut networks = BTreeMap::new();
        if let Some(ip) = image.ip {
            let _ = networks.insert("bridge".to_string(), ip);
        }
        Ok(ContainerAttributes {
            labels: image.labels,
            networks,
        })
    }

    fn remove(&self, handle: &ContainerHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.removals.push(handle.id().to_string());
        let _ = state.live.remove(handle.id());
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }
}
