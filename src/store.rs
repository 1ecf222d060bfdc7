//! Subscription layer
//!
//! A [`Store`] owns the current [`Snapshot`] and a listener table. Observers
//! select a slice of the hierarchy and are notified once on registration and
//! again after every dispatch that actually changed their slice. Because the
//! reducer shares unaffected branches by `Arc`, "changed" is a pointer
//! comparison, never a deep walk.
//!
//! Name-listing observers compare key *sets* instead: a value-only update
//! rebuilds the map (new pointer) but keeps the same names, and the listing
//! must stay quiet.
//!
//! Cancellation is synchronous. A subscription cancelled while a dispatch is
//! mid-flight is not delivered that dispatch, even if it was already snapshot
//! into the delivery list.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use crate::state::{
    reduce, Device, DeviceMap, Event, GroupMap, MetricMap, Node, NodeMap, PublisherState, Snapshot,
};
use crate::value::Metric;

struct ListenerState {
    cancelled: Cell<bool>,
    callback: RefCell<Box<dyn FnMut(&Snapshot)>>,
}

/// Handle to one registered observer.
///
/// Dropping the handle does NOT cancel; call [`Subscription::cancel`].
/// Cloning shares the same registration.
#[derive(Clone)]
pub struct Subscription {
    listener: Rc<ListenerState>,
}

impl Subscription {
    /// Remove the observer. Takes effect immediately, including for a
    /// notification round already in progress.
    pub fn cancel(&self) {
        self.listener.cancelled.set(true);
    }
}

/// The snapshot store: dispatch point and observer registry.
///
/// Single-threaded by design (`Rc` listeners); owned by the host loop that
/// also drives the client.
#[derive(Default)]
pub struct Store {
    snapshot: Snapshot,
    listeners: Vec<Rc<ListenerState>>,
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Reduce one event into the snapshot and notify observers whose slice
    /// changed.
    pub fn dispatch(&mut self, event: &Event) {
        self.snapshot = reduce(&self.snapshot, event);
        self.listeners.retain(|l| !l.cancelled.get());
        // The delivery list is pinned before the first callback runs, so a
        // callback registering new observers cannot be delivered this round.
        // The cancelled flag is re-checked per listener so cancellation from
        // inside a callback still suppresses delivery.
        let listeners: Vec<Rc<ListenerState>> = self.listeners.clone();
        for listener in listeners {
            if listener.cancelled.get() {
                continue;
            }
            (listener.callback.borrow_mut())(&self.snapshot);
        }
    }

    fn subscribe(&mut self, mut raw: Box<dyn FnMut(&Snapshot)>) -> Subscription {
        raw(&self.snapshot);
        let listener = Rc::new(ListenerState {
            cancelled: Cell::new(false),
            callback: RefCell::new(raw),
        });
        self.listeners.push(Rc::clone(&listener));
        Subscription { listener }
    }

    /// Register an observer over an `Arc`-valued slice, de-duplicated by
    /// pointer identity.
    fn observe_slice<T: 'static>(
        &mut self,
        select: impl Fn(&Snapshot) -> Option<Arc<T>> + 'static,
        mut callback: impl FnMut(Option<&Arc<T>>) + 'static,
    ) -> Subscription {
        let mut previous: Option<Option<Arc<T>>> = None;
        self.subscribe(Box::new(move |snapshot| {
            let current = select(snapshot);
            let unchanged = matches!(&previous, Some(prev) if arc_option_eq(prev, &current));
            if !unchanged {
                callback(current.as_ref());
                previous = Some(current);
            }
        }))
    }

    /// Register a name-listing observer, de-duplicated by key set.
    fn observe_names(
        &mut self,
        select: impl Fn(&Snapshot) -> Vec<String> + 'static,
        mut callback: impl FnMut(&[String]) + 'static,
    ) -> Subscription {
        let mut previous: Option<Vec<String>> = None;
        self.subscribe(Box::new(move |snapshot| {
            let current = select(snapshot);
            let unchanged = matches!(&previous, Some(prev) if same_key_set(prev, &current));
            if !unchanged {
                callback(&current);
                previous = Some(current);
            }
        }))
    }

    /// Observe the whole group map. Fires after every dispatch that changed
    /// anything anywhere in the hierarchy.
    pub fn observe_groups(
        &mut self,
        callback: impl FnMut(Option<&Arc<GroupMap>>) + 'static,
    ) -> Subscription {
        self.observe_slice(|snapshot| Some(Arc::clone(&snapshot.groups)), callback)
    }

    /// Observe one group's node map.
    pub fn observe_nodes(
        &mut self,
        group: impl Into<String>,
        callback: impl FnMut(Option<&Arc<NodeMap>>) + 'static,
    ) -> Subscription {
        let group = group.into();
        self.observe_slice(move |snapshot| snapshot.group(&group).cloned(), callback)
    }

    /// Observe one node record (state, metrics, and devices).
    pub fn observe_node(
        &mut self,
        group: impl Into<String>,
        node: impl Into<String>,
        callback: impl FnMut(Option<&Arc<Node>>) + 'static,
    ) -> Subscription {
        let (group, node) = (group.into(), node.into());
        self.observe_slice(move |snapshot| snapshot.node(&group, &node).cloned(), callback)
    }

    /// Observe one node's device map.
    pub fn observe_devices(
        &mut self,
        group: impl Into<String>,
        node: impl Into<String>,
        callback: impl FnMut(Option<&Arc<DeviceMap>>) + 'static,
    ) -> Subscription {
        let (group, node) = (group.into(), node.into());
        self.observe_slice(
            move |snapshot| {
                snapshot
                    .node(&group, &node)
                    .map(|n| Arc::clone(&n.devices))
            },
            callback,
        )
    }

    /// Observe one device record.
    pub fn observe_device(
        &mut self,
        group: impl Into<String>,
        node: impl Into<String>,
        device: impl Into<String>,
        callback: impl FnMut(Option<&Arc<Device>>) + 'static,
    ) -> Subscription {
        let (group, node, device) = (group.into(), node.into(), device.into());
        self.observe_slice(
            move |snapshot| snapshot.device(&group, &node, &device).cloned(),
            callback,
        )
    }

    /// Observe the metric-set of a node (`device: None`) or one of its
    /// devices.
    pub fn observe_metrics(
        &mut self,
        group: impl Into<String>,
        node: impl Into<String>,
        device: Option<&str>,
        callback: impl FnMut(Option<&Arc<MetricMap>>) + 'static,
    ) -> Subscription {
        let (group, node) = (group.into(), node.into());
        let device = device.map(str::to_owned);
        self.observe_slice(
            move |snapshot| snapshot.metrics(&group, &node, device.as_deref()).cloned(),
            callback,
        )
    }

    /// Observe a single metric by name.
    pub fn observe_metric(
        &mut self,
        group: impl Into<String>,
        node: impl Into<String>,
        device: Option<&str>,
        name: impl Into<String>,
        callback: impl FnMut(Option<&Arc<Metric>>) + 'static,
    ) -> Subscription {
        let (group, node, name) = (group.into(), node.into(), name.into());
        let device = device.map(str::to_owned);
        self.observe_slice(
            move |snapshot| {
                snapshot
                    .metrics(&group, &node, device.as_deref())?
                    .get(&name)
                    .cloned()
            },
            callback,
        )
    }

    /// Observe the liveness of a node (`device: None`) or device.
    ///
    /// De-duplicated by value: `None` means the entity does not exist yet.
    pub fn observe_publisher_state(
        &mut self,
        group: impl Into<String>,
        node: impl Into<String>,
        device: Option<&str>,
        mut callback: impl FnMut(Option<PublisherState>) + 'static,
    ) -> Subscription {
        let (group, node) = (group.into(), node.into());
        let device = device.map(str::to_owned);
        let mut previous: Option<Option<PublisherState>> = None;
        self.subscribe(Box::new(move |snapshot| {
            let current = match &device {
                Some(device) => snapshot.device(&group, &node, device).map(|d| d.state),
                None => snapshot.node(&group, &node).map(|n| n.state),
            };
            if previous != Some(current) {
                callback(current);
                previous = Some(current);
            }
        }))
    }

    /// Observe the set of group names.
    pub fn observe_group_names(
        &mut self,
        callback: impl FnMut(&[String]) + 'static,
    ) -> Subscription {
        self.observe_names(
            |snapshot| snapshot.groups.keys().cloned().collect(),
            callback,
        )
    }

    /// Observe the set of node names in one group.
    pub fn observe_node_names(
        &mut self,
        group: impl Into<String>,
        callback: impl FnMut(&[String]) + 'static,
    ) -> Subscription {
        let group = group.into();
        self.observe_names(
            move |snapshot| {
                snapshot
                    .group(&group)
                    .map(|nodes| nodes.keys().cloned().collect())
                    .unwrap_or_default()
            },
            callback,
        )
    }

    /// Observe the set of device names under one node.
    pub fn observe_device_names(
        &mut self,
        group: impl Into<String>,
        node: impl Into<String>,
        callback: impl FnMut(&[String]) + 'static,
    ) -> Subscription {
        let (group, node) = (group.into(), node.into());
        self.observe_names(
            move |snapshot| {
                snapshot
                    .node(&group, &node)
                    .map(|n| n.devices.keys().cloned().collect())
                    .unwrap_or_default()
            },
            callback,
        )
    }

    /// Observe the set of metric names of a node or device.
    pub fn observe_metric_names(
        &mut self,
        group: impl Into<String>,
        node: impl Into<String>,
        device: Option<&str>,
        callback: impl FnMut(&[String]) + 'static,
    ) -> Subscription {
        let (group, node) = (group.into(), node.into());
        let device = device.map(str::to_owned);
        self.observe_names(
            move |snapshot| {
                snapshot
                    .metrics(&group, &node, device.as_deref())
                    .map(|metrics| metrics.keys().cloned().collect())
                    .unwrap_or_default()
            },
            callback,
        )
    }
}

fn arc_option_eq<T>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Same cardinality and mutual membership; order does not matter.
fn same_key_set(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|key| b.contains(key))
}

/// One tier of a slash-structured metric namespace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetricTiers {
    /// Full names of metrics sitting directly at this tier
    pub metrics: Vec<String>,
    /// Folder name → full names of everything beneath it, folders in first
    /// occurrence order
    pub folders: Vec<(String, Vec<String>)>,
}

/// Split slash-tiered metric names at `tier` (`""` for the root tier).
///
/// `"Motor/Temp"` seen from the root is folder `"Motor"`; seen from tier
/// `"Motor"` it is a direct metric. Names outside the tier are ignored.
pub fn split_metric_tiers<'a>(
    names: impl IntoIterator<Item = &'a str>,
    tier: &str,
) -> MetricTiers {
    let prefix = if tier.is_empty() {
        String::new()
    } else {
        format!("{tier}/")
    };
    let mut tiers = MetricTiers::default();
    for name in names {
        let Some(rest) = name.strip_prefix(&prefix) else {
            continue;
        };
        match rest.split_once('/') {
            Some((folder, _)) => {
                match tiers.folders.iter_mut().find(|(f, _)| f == folder) {
                    Some((_, children)) => children.push(name.to_owned()),
                    None => tiers.folders.push((folder.to_owned(), vec![name.to_owned()])),
                }
            }
            None => tiers.metrics.push(name.to_owned()),
        }
    }
    tiers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::DataType;
    use crate::state::Path;
    use crate::value::{Metric as PayloadMetric, Payload, TypedValue};

    fn metric(name: &str, value: i32) -> PayloadMetric {
        PayloadMetric::new(name, DataType::Int32, TypedValue::Int(value))
    }

    fn birth(id: &str, metrics: Vec<PayloadMetric>) -> Event {
        Event::Birth {
            path: Path::parse(id).unwrap(),
            payload: Payload {
                metrics: Some(metrics),
                ..Default::default()
            },
        }
    }

    fn update(id: &str, metrics: Vec<PayloadMetric>) -> Event {
        Event::Update {
            path: Path::parse(id).unwrap(),
            payload: Payload {
                metrics: Some(metrics),
                ..Default::default()
            },
        }
    }

    fn death(id: &str) -> Event {
        Event::Death {
            path: Path::parse(id).unwrap(),
        }
    }

    fn counter() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let count = Rc::new(Cell::new(0));
        (Rc::clone(&count), count)
    }

    #[test]
    fn test_observer_fires_immediately() {
        let mut store = Store::new();
        let (count, probe) = counter();
        let _sub = store.observe_groups(move |_| count.set(count.get() + 1));
        assert_eq!(probe.get(), 1);
    }

    #[test]
    fn test_slice_observer_skips_unrelated_dispatch() {
        let mut store = Store::new();
        store.dispatch(&birth("g1/n1", vec![metric("a", 1)]));

        let (count, probe) = counter();
        let _sub = store.observe_node("g1", "n1", move |_| count.set(count.get() + 1));
        assert_eq!(probe.get(), 1);

        // Touching a different group leaves g1/n1's Arc alone.
        store.dispatch(&birth("g2/n2", vec![metric("b", 2)]));
        assert_eq!(probe.get(), 1);

        store.dispatch(&update("g1/n1", vec![metric("a", 5)]));
        assert_eq!(probe.get(), 2);
    }

    #[test]
    fn test_metric_observer_sees_value_changes_only_for_its_metric() {
        let mut store = Store::new();
        store.dispatch(&birth("g/n", vec![metric("a", 1), metric("b", 2)]));

        let seen: Rc<RefCell<Vec<TypedValue>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = store.observe_metric("g", "n", None, "a", move |m| {
            sink.borrow_mut().push(m.map(|m| m.value.clone()).unwrap_or(TypedValue::Null));
        });

        store.dispatch(&update("g/n", vec![metric("b", 9)]));
        store.dispatch(&update("g/n", vec![metric("a", 7)]));

        assert_eq!(
            *seen.borrow(),
            vec![TypedValue::Int(1), TypedValue::Int(7)]
        );
    }

    #[test]
    fn test_name_listing_ignores_value_only_updates() {
        let mut store = Store::new();
        store.dispatch(&birth("g/n", vec![metric("a", 1), metric("b", 2)]));

        let (count, probe) = counter();
        let _sub = store.observe_metric_names("g", "n", None, move |_| count.set(count.get() + 1));
        assert_eq!(probe.get(), 1);

        // New pointer, same key set.
        store.dispatch(&update("g/n", vec![metric("a", 5)]));
        assert_eq!(probe.get(), 1);

        // A genuinely new key fires exactly once.
        store.dispatch(&update("g/n", vec![metric("c", 3)]));
        assert_eq!(probe.get(), 2);
    }

    #[test]
    fn test_publisher_state_observer_dedupes_by_value() {
        let mut store = Store::new();
        let states: Rc<RefCell<Vec<Option<PublisherState>>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&states);
        let _sub = store.observe_publisher_state("g", "n", None, move |s| {
            sink.borrow_mut().push(s);
        });

        store.dispatch(&birth("g/n", vec![metric("a", 1)]));
        // Metric churn keeps liveness at Alive: no re-fire.
        store.dispatch(&update("g/n", vec![metric("a", 2)]));
        store.dispatch(&death("g/n"));

        assert_eq!(
            *states.borrow(),
            vec![
                None,
                Some(PublisherState::Alive),
                Some(PublisherState::Dead)
            ]
        );
    }

    #[test]
    fn test_cancel_stops_delivery() {
        let mut store = Store::new();
        let (count, probe) = counter();
        let sub = store.observe_groups(move |_| count.set(count.get() + 1));
        assert_eq!(probe.get(), 1);

        sub.cancel();
        store.dispatch(&birth("g/n", vec![]));
        assert_eq!(probe.get(), 1);
    }

    #[test]
    fn test_cancel_from_callback_suppresses_in_flight_delivery() {
        let mut store = Store::new();

        // The second observer is cancelled by the first, within the same
        // dispatch. Registration order decides delivery order, so the
        // cancellation lands before the second observer's turn.
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let trigger = Rc::clone(&slot);
        let _first = store.observe_groups(move |_| {
            if let Some(sub) = trigger.borrow().as_ref() {
                sub.cancel();
            }
        });
        let (count, probe) = counter();
        let second = store.observe_groups(move |_| count.set(count.get() + 1));
        *slot.borrow_mut() = Some(second);
        assert_eq!(probe.get(), 1);

        store.dispatch(&birth("g/n", vec![]));
        assert_eq!(probe.get(), 1);
    }

    #[test]
    fn test_device_observers() {
        let mut store = Store::new();
        store.dispatch(&birth("g/n", vec![]));

        let states: Rc<RefCell<Vec<Option<PublisherState>>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&states);
        let _sub = store.observe_device("g", "n", "d", move |d| {
            sink.borrow_mut().push(d.map(|d| d.state));
        });

        store.dispatch(&birth("g/n/d", vec![metric("a", 1)]));
        store.dispatch(&death("g/n/d"));

        assert_eq!(
            *states.borrow(),
            vec![
                None,
                Some(PublisherState::Alive),
                Some(PublisherState::Dead)
            ]
        );
    }

    #[test]
    fn test_group_and_node_name_listings() {
        let mut store = Store::new();
        let groups: Rc<RefCell<Vec<Vec<String>>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&groups);
        let _sub = store.observe_group_names(move |names| {
            let mut names = names.to_vec();
            names.sort();
            sink.borrow_mut().push(names);
        });

        store.dispatch(&birth("g1/n1", vec![]));
        store.dispatch(&birth("g1/n2", vec![])); // same group set
        store.dispatch(&birth("g2/n1", vec![]));

        assert_eq!(
            *groups.borrow(),
            vec![
                Vec::<String>::new(),
                vec!["g1".to_owned()],
                vec!["g1".to_owned(), "g2".to_owned()],
            ]
        );
    }

    #[test]
    fn test_split_metric_tiers_root() {
        let names = ["Speed", "Motor/Temp", "Motor/Load", "Axis/X/Pos"];
        let tiers = split_metric_tiers(names, "");
        assert_eq!(tiers.metrics, vec!["Speed"]);
        assert_eq!(
            tiers.folders,
            vec![
                (
                    "Motor".to_owned(),
                    vec!["Motor/Temp".to_owned(), "Motor/Load".to_owned()]
                ),
                ("Axis".to_owned(), vec!["Axis/X/Pos".to_owned()]),
            ]
        );
    }

    #[test]
    fn test_split_metric_tiers_nested() {
        let names = ["Speed", "Motor/Temp", "Axis/X/Pos", "Axis/Home"];
        let tiers = split_metric_tiers(names, "Axis");
        assert_eq!(tiers.metrics, vec!["Axis/Home"]);
        assert_eq!(
            tiers.folders,
            vec![("X".to_owned(), vec!["Axis/X/Pos".to_owned()])]
        );
    }
}
