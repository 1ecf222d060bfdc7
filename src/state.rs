//! State reconciliation engine
//!
//! A pure reducer folding Birth/Update/Death events into a hierarchical
//! snapshot of publishing entities: groups → nodes → devices → metric-sets.
//! Each reduction produces a new root whose unaffected branches are literally
//! the same `Arc` as before, so subscribers can detect change by pointer
//! identity instead of deep comparison.
//!
//! Semantics:
//! - Update merges sparsely and never touches liveness; entities it
//!   references are created on demand, defaulting to Dead.
//! - Birth replaces the addressed entity's metric-set wholesale and marks it
//!   Alive.
//! - Death flips liveness to Dead, keeps the last-known metrics, and never
//!   creates anything.

use std::collections::HashMap;
use std::sync::Arc;

use crate::value::{Metric, Payload, PropertySet, PropertyValue, TypedValue};

/// Liveness of a node or device.
///
/// Entities referenced before their birth default to Dead; death never
/// removes them, it only flips this flag back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublisherState {
    Alive,
    #[default]
    Dead,
}

/// Metric name → metric, the leaf collection of the hierarchy.
pub type MetricMap = HashMap<String, Arc<Metric>>;
/// Device name → device.
pub type DeviceMap = HashMap<String, Arc<Device>>;
/// Node name → node; one of these per group.
pub type NodeMap = HashMap<String, Arc<Node>>;
/// Group name → that group's nodes.
pub type GroupMap = HashMap<String, Arc<NodeMap>>;

/// A device: liveness plus its metric-set.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub state: PublisherState,
    pub metrics: Arc<MetricMap>,
}

/// A node: liveness, its own metric-set, and its devices.
///
/// A node's metrics are independent of its devices'; a dead node says
/// nothing structural about its devices, though callers should not trust
/// device updates arriving under a dead node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub state: PublisherState,
    pub metrics: Arc<MetricMap>,
    pub devices: Arc<DeviceMap>,
}

impl Node {
    fn empty() -> Self {
        Node {
            state: PublisherState::Dead,
            metrics: Arc::new(MetricMap::new()),
            devices: Arc::new(DeviceMap::new()),
        }
    }
}

/// An immutable snapshot of the whole hierarchy.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub groups: Arc<GroupMap>,
}

impl Snapshot {
    pub fn new() -> Self {
        Snapshot::default()
    }

    pub fn group(&self, group: &str) -> Option<&Arc<NodeMap>> {
        self.groups.get(group)
    }

    pub fn node(&self, group: &str, node: &str) -> Option<&Arc<Node>> {
        self.groups.get(group)?.get(node)
    }

    pub fn device(&self, group: &str, node: &str, device: &str) -> Option<&Arc<Device>> {
        self.node(group, node)?.devices.get(device)
    }

    /// The metric-set of a node, or of one of its devices.
    pub fn metrics(&self, group: &str, node: &str, device: Option<&str>) -> Option<&Arc<MetricMap>> {
        let node = self.node(group, node)?;
        match device {
            Some(device) => Some(&node.devices.get(device)?.metrics),
            None => Some(&node.metrics),
        }
    }
}

/// A parsed `group/node[/device]` identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    pub group: String,
    pub node: String,
    pub device: Option<String>,
}

impl Path {
    /// Parse a slash-delimited identifier. The group and node segments are
    /// required; anything after the device segment is ignored.
    pub fn parse(id: &str) -> Option<Path> {
        let mut sections = id.split('/');
        let group = sections.next().filter(|s| !s.is_empty())?.to_owned();
        let node = sections.next().filter(|s| !s.is_empty())?.to_owned();
        let device = sections.next().filter(|s| !s.is_empty()).map(str::to_owned);
        Some(Path {
            group,
            node,
            device,
        })
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.device {
            Some(device) => write!(f, "{}/{}/{}", self.group, self.node, device),
            None => write!(f, "{}/{}", self.group, self.node),
        }
    }
}

/// One reconciliation event, produced from a decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Sparse merge of metrics into the addressed entity
    Update { path: Path, payload: Payload },
    /// Full replacement of the addressed entity's metric-set
    Birth { path: Path, payload: Payload },
    /// The addressed entity went stale
    Death { path: Path },
}

/// Fold one event into the snapshot, returning the next snapshot.
///
/// Referentially transparent: no hidden state, and the input snapshot is
/// never mutated. Branches the event does not touch keep pointer identity.
pub fn reduce(snapshot: &Snapshot, event: &Event) -> Snapshot {
    match event {
        Event::Update { path, payload } => apply_update(snapshot, path, payload),
        Event::Birth { path, payload } => apply_birth(snapshot, path, payload),
        Event::Death { path } => apply_death(snapshot, path),
    }
}

fn with_group(
    snapshot: &Snapshot,
    group_name: &str,
    build: impl FnOnce(&NodeMap) -> NodeMap,
) -> Snapshot {
    let empty = NodeMap::new();
    let nodes = snapshot
        .groups
        .get(group_name)
        .map(|nodes| nodes.as_ref())
        .unwrap_or(&empty);
    let mut groups = (*snapshot.groups).clone();
    groups.insert(group_name.to_owned(), Arc::new(build(nodes)));
    Snapshot {
        groups: Arc::new(groups),
    }
}

fn apply_update(snapshot: &Snapshot, path: &Path, payload: &Payload) -> Snapshot {
    with_group(snapshot, &path.group, |nodes| {
        let node = nodes.get(&path.node).map(Arc::as_ref);
        let next_node = match &path.device {
            Some(device_name) => {
                // Device update: the node keeps its own state and metrics,
                // the addressed device is created Dead if unknown.
                let base = node.cloned().unwrap_or_else(Node::empty);
                let device = base.devices.get(device_name).map(Arc::as_ref);
                let next_device = Device {
                    state: device.map(|d| d.state).unwrap_or_default(),
                    metrics: Arc::new(apply_metrics(
                        device.map(|d| d.metrics.as_ref()),
                        payload.metrics.as_deref(),
                    )),
                };
                let mut devices = (*base.devices).clone();
                devices.insert(device_name.clone(), Arc::new(next_device));
                Node {
                    state: base.state,
                    metrics: base.metrics,
                    devices: Arc::new(devices),
                }
            }
            None => Node {
                state: node.map(|n| n.state).unwrap_or_default(),
                metrics: Arc::new(apply_metrics(
                    node.map(|n| n.metrics.as_ref()),
                    payload.metrics.as_deref(),
                )),
                devices: node
                    .map(|n| Arc::clone(&n.devices))
                    .unwrap_or_else(|| Arc::new(DeviceMap::new())),
            },
        };
        let mut nodes = nodes.clone();
        nodes.insert(path.node.clone(), Arc::new(next_node));
        nodes
    })
}

fn apply_birth(snapshot: &Snapshot, path: &Path, payload: &Payload) -> Snapshot {
    with_group(snapshot, &path.group, |nodes| {
        let next_node = match &path.device {
            Some(device_name) => {
                // Device birth: a missing parent node is created Dead; its
                // own state and metrics are untouched either way.
                let base = nodes
                    .get(&path.node)
                    .map(|n| n.as_ref().clone())
                    .unwrap_or_else(Node::empty);
                let device = Device {
                    state: PublisherState::Alive,
                    metrics: Arc::new(apply_metrics(None, payload.metrics.as_deref())),
                };
                let mut devices = (*base.devices).clone();
                devices.insert(device_name.clone(), Arc::new(device));
                Node {
                    devices: Arc::new(devices),
                    ..base
                }
            }
            // Node birth resets the whole record: fresh metric-set, fresh
            // device map.
            None => Node {
                state: PublisherState::Alive,
                metrics: Arc::new(apply_metrics(None, payload.metrics.as_deref())),
                devices: Arc::new(DeviceMap::new()),
            },
        };
        let mut nodes = nodes.clone();
        nodes.insert(path.node.clone(), Arc::new(next_node));
        nodes
    })
}

fn apply_death(snapshot: &Snapshot, path: &Path) -> Snapshot {
    // Death never creates: any missing link along the path makes it a no-op
    // that hands back the same root.
    let Some(nodes) = snapshot.groups.get(&path.group) else {
        return snapshot.clone();
    };
    let Some(node) = nodes.get(&path.node) else {
        return snapshot.clone();
    };
    let next_node = match &path.device {
        Some(device_name) => {
            let Some(device) = node.devices.get(device_name) else {
                return snapshot.clone();
            };
            let next_device = Device {
                state: PublisherState::Dead,
                metrics: Arc::clone(&device.metrics),
            };
            let mut devices = (*node.devices).clone();
            devices.insert(device_name.clone(), Arc::new(next_device));
            Node {
                state: node.state,
                metrics: Arc::clone(&node.metrics),
                devices: Arc::new(devices),
            }
        }
        None => Node {
            state: PublisherState::Dead,
            metrics: Arc::clone(&node.metrics),
            devices: Arc::clone(&node.devices),
        },
    };
    with_group(snapshot, &path.group, |nodes| {
        let mut nodes = nodes.clone();
        nodes.insert(path.node.clone(), Arc::new(next_node));
        nodes
    })
}

/// Fold a payload's metrics into a metric-set.
///
/// Unnamed metrics cannot be keyed and are skipped. Merge order follows the
/// incoming list's order.
fn apply_metrics(base: Option<&MetricMap>, metrics: Option<&[Metric]>) -> MetricMap {
    let mut out = base.cloned().unwrap_or_default();
    let Some(metrics) = metrics else {
        return out;
    };
    for incoming in metrics {
        let Some(name) = incoming.name.clone() else {
            continue;
        };
        let next = match out.get(&name) {
            Some(existing) => merge_metric(existing, incoming),
            None => incoming.clone(),
        };
        out.insert(name, Arc::new(next));
    }
    out
}

/// Shallow field-by-field merge: every field the incoming metric sets
/// overwrites the existing one (the value and declared type always count as
/// set), except `properties`, which merges sparsely and recursively.
fn merge_metric(existing: &Metric, incoming: &Metric) -> Metric {
    Metric {
        name: incoming.name.clone().or_else(|| existing.name.clone()),
        alias: incoming.alias.or(existing.alias),
        timestamp: incoming.timestamp.or(existing.timestamp),
        datatype: incoming.datatype,
        is_historical: incoming.is_historical.or(existing.is_historical),
        is_transient: incoming.is_transient.or(existing.is_transient),
        is_null: incoming.is_null.or(existing.is_null),
        metadata: incoming
            .metadata
            .clone()
            .or_else(|| existing.metadata.clone()),
        properties: match &incoming.properties {
            Some(incoming_set) => Some(merge_property_set(
                existing.properties.as_ref(),
                incoming_set,
            )),
            None => existing.properties.clone(),
        },
        value: incoming.value.clone(),
    }
}

/// Sparse, recursive property merge.
///
/// Keys absent from the incoming set stay untouched. An incoming nested
/// PropertySet recurses into the existing nested set (empty if absent or not
/// a set); any other incoming value replaces the whole entry. Order follows
/// the incoming set's key order.
fn merge_property_set(existing: Option<&PropertySet>, incoming: &PropertySet) -> PropertySet {
    let mut out = existing.cloned().unwrap_or_default();
    for (key, incoming_value) in incoming.iter() {
        match &incoming_value.value {
            TypedValue::PropertySet(nested_incoming) => {
                let nested_existing = out.get(key).and_then(|pv| match &pv.value {
                    TypedValue::PropertySet(set) => Some(set),
                    _ => None,
                });
                let merged = merge_property_set(nested_existing, nested_incoming);
                out.insert(
                    key,
                    PropertyValue {
                        datatype: incoming_value.datatype,
                        is_null: false,
                        value: TypedValue::PropertySet(merged),
                    },
                );
            }
            _ => out.insert(key, incoming_value.clone()),
        }
    }
    out
}
