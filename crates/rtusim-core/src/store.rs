//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Point simulation and control-mapping engine."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use rtusim_common::SimConfig;
use rtusim_logging::{rtu_debug, InstanceContext};

use crate::errors::{LookupQuery, Result, RtuError};
use crate::point::{Point, PointChange, PointKind, PointValue, QualityFlags};

/// Host interface notified whenever a point's value or quality changes.
pub trait Publisher: Send + Sync {
    fn publish(&self, ctx: &InstanceContext, change: &PointChange);
}

/// Publisher that keeps every change in memory. Used by harnesses and tests.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    changes: Mutex<Vec<PointChange>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> Vec<PointChange> {
        self.changes.lock().clone()
    }

    /// Drain the recorded changes.
    pub fn take(&self) -> Vec<PointChange> {
        std::mem::take(&mut *self.changes.lock())
    }

    pub fn len(&self) -> usize {
        self.changes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.lock().is_empty()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, _ctx: &InstanceContext, change: &PointChange) {
        self.changes.lock().push(change.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DeviceKey {
    device_type: String,
    number: u32,
    bit_id: Option<u32>,
}

#[derive(Debug, Default)]
struct PointTable {
    points: Vec<Point>,
    by_index: IndexMap<u32, usize>,
    by_key: HashMap<DeviceKey, usize>,
}

impl PointTable {
    fn insert(&mut self, point: Point) {
        let position = self.points.len();
        self.by_index.insert(point.index, position);
        // analogs may share a device key; the first definition wins
        self.by_key
            .entry(DeviceKey {
                device_type: point.device_type.clone(),
                number: point.number,
                bit_id: point.bit_id,
            })
            .or_insert(position);
        self.points.push(point);
    }
}

/// Holds every configured point and publishes changes to the host.
///
/// The topology is fixed when the store is built: points are never added or
/// removed afterwards, only their value and quality change.
pub struct PointStore {
    binaries: PointTable,
    analogs: PointTable,
    publisher: Arc<dyn Publisher>,
}

impl std::fmt::Debug for PointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointStore")
            .field("binaries", &self.binaries.points.len())
            .field("analogs", &self.analogs.points.len())
            .finish()
    }
}

impl PointStore {
    /// An empty store, used until the first configuration is applied.
    pub fn empty(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            binaries: PointTable::default(),
            analogs: PointTable::default(),
            publisher,
        }
    }

    pub fn from_config(config: &SimConfig, publisher: Arc<dyn Publisher>) -> Self {
        let mut store = Self::empty(publisher);
        for analog in &config.analogs {
            store.analogs.insert(Point::analog(
                analog.index,
                &analog.device_type,
                analog.number,
                analog.value,
            ));
        }
        for binary in &config.binaries {
            store.binaries.insert(Point::binary(
                binary.index,
                &binary.device_type,
                binary.number,
                binary.bit_id,
                binary.value,
            ));
        }
        store
    }

    fn table(&self, kind: PointKind) -> &PointTable {
        match kind {
            PointKind::Binary => &self.binaries,
            PointKind::Analog => &self.analogs,
        }
    }

    fn table_mut(&mut self, kind: PointKind) -> &mut PointTable {
        match kind {
            PointKind::Binary => &mut self.binaries,
            PointKind::Analog => &mut self.analogs,
        }
    }

    /// Find a point by device type, number and bit. Analogs are looked up with `bit_id = None`.
    pub fn lookup(
        &self,
        kind: PointKind,
        device_type: &str,
        number: u32,
        bit_id: Option<u32>,
    ) -> Result<&Point> {
        let key = DeviceKey {
            device_type: device_type.to_owned(),
            number,
            bit_id,
        };
        let table = self.table(kind);
        table
            .by_key
            .get(&key)
            .map(|&position| &table.points[position])
            .ok_or_else(|| {
                RtuError::not_found(LookupQuery::Key {
                    kind,
                    device_type: key.device_type,
                    number,
                    bit_id,
                })
            })
    }

    pub fn lookup_by_index(&self, kind: PointKind, index: u32) -> Result<&Point> {
        let table = self.table(kind);
        table
            .by_index
            .get(&index)
            .map(|&position| &table.points[position])
            .ok_or_else(|| RtuError::not_found(LookupQuery::Index { kind, index }))
    }

    /// Update a point's value, publishing only when it actually changed.
    ///
    /// Writing the current value again is a no-op and emits nothing.
    pub fn set_value(
        &mut self,
        ctx: &InstanceContext,
        kind: PointKind,
        index: u32,
        value: PointValue,
    ) -> Result<bool> {
        if value.kind() != kind {
            return Err(RtuError::bad_request(format!(
                "{kind} point {index} cannot hold a {} value",
                value.kind()
            )));
        }
        if let PointValue::Binary(bit) = value {
            if bit > 1 {
                return Err(RtuError::bad_request(format!(
                    "binary point {index} cannot hold {bit}"
                )));
            }
        }

        let publisher = Arc::clone(&self.publisher);
        let table = self.table_mut(kind);
        let position = *table
            .by_index
            .get(&index)
            .ok_or_else(|| RtuError::not_found(LookupQuery::Index { kind, index }))?;
        let point = &mut table.points[position];
        if point.value == value {
            rtu_debug!(context = ctx, "no change in {} point {} value {}", kind, index, value);
            return Ok(false);
        }
        point.value = value;
        publisher.publish(ctx, &point.to_change());
        Ok(true)
    }

    /// Replace a point's quality flags, publishing on change.
    pub fn set_quality(
        &mut self,
        ctx: &InstanceContext,
        kind: PointKind,
        index: u32,
        quality: QualityFlags,
    ) -> Result<bool> {
        let publisher = Arc::clone(&self.publisher);
        let table = self.table_mut(kind);
        let position = *table
            .by_index
            .get(&index)
            .ok_or_else(|| RtuError::not_found(LookupQuery::Index { kind, index }))?;
        let point = &mut table.points[position];
        if point.quality == quality {
            return Ok(false);
        }
        point.quality = quality;
        publisher.publish(ctx, &point.to_change());
        Ok(true)
    }

    /// Points of one kind in configuration order.
    pub fn all_points(&self, kind: PointKind) -> &[Point] {
        &self.table(kind).points
    }

    pub fn len(&self, kind: PointKind) -> usize {
        self.table(kind).points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analogs.points.is_empty() && self.binaries.points.is_empty()
    }

    /// Publish the current state of every point, analogs first. Returns the number published.
    pub fn publish_all(&self, ctx: &InstanceContext) -> usize {
        let mut published = 0;
        for kind in [PointKind::Analog, PointKind::Binary] {
            for point in self.all_points(kind) {
                self.publisher.publish(ctx, &point.to_change());
                published += 1;
            }
        }
        published
    }
}
