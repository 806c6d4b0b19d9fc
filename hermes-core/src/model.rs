//! The wire model: revisions, kinds, change events, desired snapshots,
//! instance records, and controller status reports (`spec.md` §3, §6).

use crate::config::EtcdConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// A monotonically non-decreasing revision issued by the control plane.
///
/// Newtyped over `i64` so it cannot be silently compared against or assigned
/// from an unrelated integer (a poll-interval in seconds, say).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub i64);

impl Revision {
    /// The revision value a freshly started process begins at, before any
    /// full reconcile has run.
    pub const ZERO: Revision = Revision(0);
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lock-free shared storage for the "last observed revision" (`spec.md` §3,
/// §5). Readers (heartbeat reporter, diagnostics) only ever need an atomic
/// load; the poller performs the sole atomic store, and only ever advances
/// it, per the revision-never-decreases invariant.
#[derive(Debug, Clone)]
pub struct SharedRevision(Arc<AtomicI64>);

impl SharedRevision {
    /// Start tracking at revision 0.
    pub fn new() -> Self {
        Self(Arc::new(AtomicI64::new(0)))
    }

    /// Read the current revision.
    pub fn get(&self) -> Revision {
        Revision(self.0.load(Ordering::SeqCst))
    }

    /// Unconditionally set the revision (used once, at startup bootstrap).
    pub fn set(&self, rev: Revision) {
        self.0.store(rev.0, Ordering::SeqCst);
    }

    /// Advance the revision to `rev` if it is greater than the current
    /// value. Returns `true` if the value changed.
    pub fn advance_to(&self, rev: Revision) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
                if rev.0 > cur {
                    Some(rev.0)
                } else {
                    None
                }
            })
            .is_ok()
    }
}

impl Default for SharedRevision {
    fn default() -> Self {
        Self::new()
    }
}

/// The closed set of object kinds this controller reconciles.
///
/// Per the design notes in `spec.md` §9, kind dispatch is a closed
/// enumeration rather than open polymorphism: there are exactly two kinds,
/// known at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// A gateway routing domain.
    Domain,
    /// A gateway upstream cluster.
    Cluster,
}

impl Kind {
    /// Parse a wire `kind` string. Returns `None` for anything this
    /// controller doesn't recognize — callers log and skip rather than fail.
    pub fn parse(s: &str) -> Option<Kind> {
        match s {
            "domain" => Some(Kind::Domain),
            "cluster" => Some(Kind::Cluster),
            _ => None,
        }
    }

    /// The KV prefix configured for this kind.
    pub fn prefix<'a>(&self, etcd: &'a EtcdConfig) -> &'a str {
        match self {
            Kind::Domain => &etcd.domain_prefix,
            Kind::Cluster => &etcd.cluster_prefix,
        }
    }

    /// The wire name for this kind, e.g. the field name carrying its payload
    /// on a [`ChangeEvent`].
    pub fn wire_name(&self) -> &'static str {
        match self {
            Kind::Domain => "domain",
            Kind::Cluster => "cluster",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// The action carried by a [`ChangeEvent`]. All non-delete actions are
/// treated identically by the applier — they all map to an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// A brand new object.
    Create,
    /// A modification of an existing object.
    Update,
    /// A restore to a previous version.
    Rollback,
    /// An externally imported object.
    Import,
    /// The object was removed.
    Delete,
}

impl Action {
    /// Whether this action removes the key (`true`) or upserts it (`false`).
    pub fn is_delete(&self) -> bool {
        matches!(self, Action::Delete)
    }
}

/// A single incremental change event from the control plane's change stream.
///
/// The wire shape keys the payload by kind name (e.g. a `"cluster"` field
/// rather than a generic `"payload"` field) — see `SPEC_FULL.md` §3 for why
/// `ChangeEvent` exposes [`ChangeEvent::raw_payload`] instead of a literal
/// `payload` field.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeEvent {
    /// The revision this event was recorded at.
    pub revision: Revision,
    /// The wire kind string; unrecognized values are handled by the caller
    /// via [`Kind::parse`], not rejected at deserialize time.
    pub kind: String,
    /// The object name, used to build the KV key.
    pub name: String,
    /// What happened to the object.
    pub action: Action,
    /// Every field on the wire object that isn't `revision`/`kind`/`name`/`action`.
    #[serde(flatten)]
    extra: HashMap<String, Box<RawValue>>,
}

impl ChangeEvent {
    /// The raw JSON payload for this event, if present. Absent for `delete`
    /// events, and for any event whose kind-named field was omitted.
    pub fn raw_payload(&self) -> Option<&RawValue> {
        self.extra.get(self.kind.as_str()).map(|b| b.as_ref())
    }
}

/// A control-plane poll response (`spec.md` §4.5, §6).
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeResponse {
    /// Events strictly after the requested revision, in order.
    pub events: Vec<ChangeEvent>,
    /// The revision as of this response.
    pub revision: Revision,
    /// Total event count (informational; unused by the controller logic).
    #[serde(default)]
    pub total: i64,
}

/// The full desired-state snapshot (`spec.md` §3, §6).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DesiredSnapshot {
    /// Desired domain objects, opaque beyond their `name` field.
    #[serde(default)]
    pub domains: Vec<serde_json::Value>,
    /// Desired cluster objects, opaque beyond their `name` field.
    #[serde(default)]
    pub clusters: Vec<serde_json::Value>,
}

/// Envelope returned by `GET /api/v1/config`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigEnvelope {
    /// The desired snapshot.
    pub config: DesiredSnapshot,
}

/// Extract the `name` field from an opaque desired-state object, if present
/// and non-empty. Objects without a name are skipped by the reconciler
/// (logged as a warning), per the explicit non-goal that the controller does
/// not validate object schemas.
pub fn object_name(value: &serde_json::Value) -> Option<&str> {
    value.get("name").and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

/// What a gateway writes under the instance prefix (`spec.md` §3). The
/// controller is a pure observer of these records; every field but `id`
/// tolerates absence so that older gateway versions which predate a field
/// don't break decoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// The gateway instance's self-assigned identifier.
    pub id: String,
    /// Free-form status string as reported by the gateway.
    #[serde(default)]
    pub status: String,
    /// When the gateway process started.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the gateway registered itself in the KV store.
    #[serde(default)]
    pub registered_at: Option<DateTime<Utc>>,
    /// The last time the gateway refreshed its keepalive.
    #[serde(default)]
    pub last_keepalive_at: Option<DateTime<Utc>>,
    /// The config revision the gateway last applied.
    #[serde(default)]
    pub config_revision: Option<Revision>,
}

impl InstanceRecord {
    /// Decode a record, falling back to an `id`-only record (using the KV
    /// key with the instance prefix stripped) if the bytes don't parse —
    /// per `spec.md` §4.6.
    pub fn decode_or_fallback(bytes: &[u8], fallback_id: &str) -> InstanceRecord {
        serde_json::from_slice(bytes).unwrap_or_else(|_| InstanceRecord {
            id: fallback_id.to_string(),
            status: String::new(),
            started_at: None,
            registered_at: None,
            last_keepalive_at: None,
            config_revision: None,
        })
    }
}

/// Controller liveness status reported in heartbeats (`spec.md` §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerStatus {
    /// The process is starting up.
    Starting,
    /// The process is running normally (leader or follower).
    Running,
    /// The process is shutting down; this is the final, best-effort report.
    ShuttingDown,
}

/// Body of `PUT /api/v1/status/controller` (`spec.md` §6).
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatusReport {
    /// Controller identity (hostname or equivalent).
    pub id: String,
    /// Current lifecycle status.
    pub status: ControllerStatus,
    /// When this controller process started.
    pub started_at: DateTime<Utc>,
    /// When this report was generated.
    pub last_heartbeat_at: DateTime<Utc>,
    /// The last observed control-plane revision.
    pub config_revision: Revision,
    /// Whether this controller currently holds leadership.
    pub is_leader: bool,
}

/// Body of `PUT /api/v1/status/instances` (`spec.md` §6).
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstancesReport {
    /// The full, authoritative list of gateway instances observed in the KV store.
    pub instances: Vec<InstanceRecord>,
}
