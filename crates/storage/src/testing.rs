//! Test doubles for the executor and observer seams
//!
//! Available to this crate's tests and, with the `testing` feature, to
//! integration tests.

use std::collections::HashMap;

use parking_lot::Mutex;
use vdi_core::Error;

use crate::{CommandExecutor, ProcessFailure, StoreObserver, StoreStep, SNAPSHOT_TAG};

/// One `vdi` command line seen by a fake executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub command_line: String,
    /// Subcommand including its flags, e.g. `read -s glance-image`
    pub subcommand: String,
    pub volume: String,
    pub params: Vec<String>,
    pub input: Option<Vec<u8>>,
}

impl RecordedCall {
    /// Split `<tool> vdi <subcommand> -a <addr> -p <port> <volume> [params]`
    pub fn parse(command_line: &str, input: Option<&[u8]>) -> Self {
        let (head, tail) = command_line
            .split_once(" -a ")
            .unwrap_or((command_line, ""));
        let subcommand = head
            .split_once(" vdi ")
            .map(|(_, sub)| sub)
            .unwrap_or(head)
            .to_string();

        // tail: <addr> -p <port> <volume> [params...]
        let mut rest = tail.split_whitespace().skip(3);
        let volume = rest.next().unwrap_or_default().to_string();
        let params = rest.map(str::to_string).collect();

        Self {
            command_line: command_line.to_string(),
            subcommand,
            volume,
            params,
            input: input.map(<[u8]>::to_vec),
        }
    }
}

/// Executor that records every call and answers from canned responses
///
/// Unknown subcommands succeed with empty output, so `list -r` reports a
/// missing volume unless a response is set.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<RecordedCall>>,
    responses: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, String>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `subcommand` with `output`
    pub fn respond(&self, subcommand: &str, output: &[u8]) {
        self.responses
            .lock()
            .insert(subcommand.to_string(), output.to_vec());
    }

    /// Fail every `subcommand` with `stderr`
    pub fn fail_on(&self, subcommand: &str, stderr: &str) {
        self.failures
            .lock()
            .insert(subcommand.to_string(), stderr.to_string());
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Subcommands in call order
    pub fn subcommands(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.subcommand.clone()).collect()
    }
}

impl CommandExecutor for RecordingExecutor {
    fn execute(&self, command_line: &str, input: Option<&[u8]>) -> Result<Vec<u8>, ProcessFailure> {
        let call = RecordedCall::parse(command_line, input);
        let subcommand = call.subcommand.clone();
        self.calls.lock().push(call);

        if let Some(stderr) = self.failures.lock().get(&subcommand) {
            return Err(ProcessFailure::Exit {
                command: command_line.to_string(),
                status: "exit status: 1".to_string(),
                stderr: stderr.clone(),
            });
        }
        Ok(self
            .responses
            .lock()
            .get(&subcommand)
            .cloned()
            .unwrap_or_default())
    }
}

/// A failure reported to a [`RecordingObserver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedFailure {
    pub image_id: String,
    pub step: StoreStep,
    pub cleanup: bool,
    pub message: String,
}

/// Observer that keeps every reported failure
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedFailure>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservedFailure> {
        self.events.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.message.clone()).collect()
    }

    /// `(step, cleanup)` pairs in report order
    pub fn steps(&self) -> Vec<(StoreStep, bool)> {
        self.events.lock().iter().map(|e| (e.step, e.cleanup)).collect()
    }
}

impl StoreObserver for RecordingObserver {
    fn step_failed(&self, image_id: &str, step: StoreStep, _error: &Error) {
        self.events.lock().push(ObservedFailure {
            image_id: image_id.to_string(),
            step,
            cleanup: false,
            message: step.message().to_string(),
        });
    }

    fn cleanup_failed(&self, image_id: &str, step: StoreStep, _error: &Error) {
        self.events.lock().push(ObservedFailure {
            image_id: image_id.to_string(),
            step,
            cleanup: true,
            message: format!("Error in cleanup of image after failed {step}"),
        });
    }
}

#[derive(Debug, Default, Clone)]
struct SimulatedVdi {
    working: Option<Vec<u8>>,
    snapshot: Option<Vec<u8>>,
}

/// In-memory stand-in for a Sheepdog cluster behind the control tool
///
/// Understands the `vdi` subcommands the store issues and rejects the same
/// things the real tool does: creating an existing volume, touching a
/// missing one, snapshotting twice under the same tag.
#[derive(Debug, Default)]
pub struct ClusterSimulator {
    vdis: Mutex<HashMap<String, SimulatedVdi>>,
    failures: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ClusterSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `subcommand` with `stderr`
    pub fn fail_on(&self, subcommand: &str, stderr: &str) {
        self.failures
            .lock()
            .insert(subcommand.to_string(), stderr.to_string());
    }

    /// Stop failing `subcommand`
    pub fn heal(&self, subcommand: &str) {
        self.failures.lock().remove(subcommand);
    }

    pub fn subcommands(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.subcommand.clone()).collect()
    }

    /// Whether a working volume named `name` exists
    pub fn has_volume(&self, name: &str) -> bool {
        self.vdis
            .lock()
            .get(name)
            .is_some_and(|v| v.working.is_some())
    }

    /// Contents of the snapshot of `name`, if any
    pub fn snapshot(&self, name: &str) -> Option<Vec<u8>> {
        self.vdis.lock().get(name).and_then(|v| v.snapshot.clone())
    }

    /// Whether nothing at all is stored under `name`
    pub fn is_absent(&self, name: &str) -> bool {
        !self.vdis.lock().contains_key(name)
    }

    fn apply(&self, call: &RecordedCall) -> Result<Vec<u8>, String> {
        let mut vdis = self.vdis.lock();
        let name = call.volume.as_str();
        let param = |i: usize| -> Result<u64, String> {
            call.params
                .get(i)
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| format!("missing numeric argument {i}"))
        };
        let snapshot_sub = |op: &str| format!("{op} -s {SNAPSHOT_TAG}");

        match call.subcommand.as_str() {
            "list -r" => Ok(match vdis.get(name) {
                Some(vdi) => {
                    let mut out = String::new();
                    if let Some(data) = &vdi.snapshot {
                        out.push_str(&format!("s {name} 1 {} 0 0 0 a0c6e 2\n", data.len()));
                    }
                    if let Some(data) = &vdi.working {
                        out.push_str(&format!("= {name} 0 {} 0 0 0 a0c6f 2\n", data.len()));
                    }
                    out.into_bytes()
                }
                None => Vec::new(),
            }),
            "create" => {
                let size = param(0)? as usize;
                let vdi = vdis.entry(name.to_string()).or_default();
                if vdi.working.is_some() {
                    return Err("VDI exists already".to_string());
                }
                vdi.working = Some(vec![0; size]);
                Ok(Vec::new())
            }
            "resize" => {
                let size = param(0)? as usize;
                let data = working_mut(&mut vdis, name)?;
                if size < data.len() {
                    return Err("Shrinking VDIs is not implemented".to_string());
                }
                data.resize(size, 0);
                Ok(Vec::new())
            }
            "write" => {
                let (offset, count) = (param(0)? as usize, param(1)? as usize);
                let input = call.input.clone().unwrap_or_default();
                let data = working_mut(&mut vdis, name)?;
                if offset + count > data.len() || input.len() != count {
                    return Err("Failed to write to VDI: bad range".to_string());
                }
                data[offset..offset + count].copy_from_slice(&input);
                Ok(Vec::new())
            }
            "delete" => match vdis.get_mut(name) {
                Some(vdi) if vdi.working.is_some() => {
                    vdi.working = None;
                    if vdi.snapshot.is_none() {
                        vdis.remove(name);
                    }
                    Ok(Vec::new())
                }
                _ => Err(format!("Failed to open VDI {name}: No VDI found")),
            },
            sub if sub == snapshot_sub("snapshot") => {
                let vdi = vdis
                    .get_mut(name)
                    .ok_or_else(|| format!("Failed to open VDI {name}: No VDI found"))?;
                if vdi.snapshot.is_some() {
                    return Err("VDI tag exists already".to_string());
                }
                let data = vdi.working.clone().ok_or("No working VDI to snapshot")?;
                vdi.snapshot = Some(data);
                Ok(Vec::new())
            }
            sub if sub == snapshot_sub("read") => {
                let (offset, count) = (param(0)? as usize, param(1)? as usize);
                let data = vdis
                    .get(name)
                    .and_then(|v| v.snapshot.as_ref())
                    .ok_or_else(|| format!("Failed to open VDI {name}: No VDI found"))?;
                let end = (offset + count).min(data.len());
                Ok(data.get(offset..end).unwrap_or_default().to_vec())
            }
            sub if sub == snapshot_sub("delete") => match vdis.get_mut(name) {
                Some(vdi) if vdi.snapshot.is_some() => {
                    vdi.snapshot = None;
                    if vdi.working.is_none() {
                        vdis.remove(name);
                    }
                    Ok(Vec::new())
                }
                _ => Err(format!("Failed to open VDI {name}: No VDI found")),
            },
            other => Err(format!("unknown subcommand {other}")),
        }
    }
}

fn working_mut<'a>(
    vdis: &'a mut HashMap<String, SimulatedVdi>,
    name: &str,
) -> Result<&'a mut Vec<u8>, String> {
    vdis.get_mut(name)
        .and_then(|v| v.working.as_mut())
        .ok_or_else(|| format!("Failed to open VDI {name}: No VDI found"))
}

impl CommandExecutor for ClusterSimulator {
    fn execute(&self, command_line: &str, input: Option<&[u8]>) -> Result<Vec<u8>, ProcessFailure> {
        let call = RecordedCall::parse(command_line, input);
        self.calls.lock().push(call.clone());

        let injected = self.failures.lock().get(&call.subcommand).cloned();
        let result = match injected {
            Some(stderr) => Err(stderr),
            None => self.apply(&call),
        };

        result.map_err(|stderr| ProcessFailure::Exit {
            command: command_line.to_string(),
            status: "exit status: 1".to_string(),
            stderr,
        })
    }
}
