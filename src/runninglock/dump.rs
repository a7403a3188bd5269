/*!
 * Running Lock Dump
 * Human-readable diagnostic rendering of registry state
 */

use super::proxy::ProxySnapshot;
use crate::core::types::{LockRecord, LockState, LockType};
use crate::proximity::ProximityState;
use std::fmt::Write;
use std::time::Instant;

/// Registry state captured for one dump
pub struct DumpInput<'a> {
    /// Records sorted by handle, each with whether the lock is frozen
    pub records: &'a [(LockRecord, bool)],
    /// Committed count per lock type
    pub counters: &'a [(LockType, u32)],
    pub proxies: &'a [ProxySnapshot],
    pub proximity: ProximityState,
}

pub fn render(input: &DumpInput<'_>, now: Instant) -> String {
    let mut out = String::new();
    let valid = input.records.iter().filter(|(r, _)| r.is_enabled()).count();

    let _ = writeln!(out, "RUNNING LOCK DUMP:");
    let _ = writeln!(out, "  totalSize={} validSize={}", input.records.len(), valid);

    let _ = writeln!(out, "Summary By Type: ");
    for (lock_type, count) in input.counters {
        let _ = writeln!(out, "  {}: {}", lock_type, count);
    }

    if input.records.is_empty() {
        let _ = writeln!(out, "Lock List is Empty. ");
        return out;
    }

    let _ = writeln!(out, "Dump Lock List: ");
    for (index, (record, frozen)) in input.records.iter().enumerate() {
        let age = now.saturating_duration_since(record.created_at).as_millis();
        let _ = write!(
            out,
            "  index={} time={}ms type={} name={} uid={} pid={} state={}",
            index + 1,
            age,
            record.param.lock_type,
            record.param.name,
            record.param.uid,
            record.param.pid,
            record.state
        );
        // Frozen but this lock could not be suspended
        if *frozen && record.state == LockState::Enabled {
            out.push_str(" PROXIED-BUT-ENABLED");
        }
        out.push('\n');
    }

    let _ = writeln!(out, "Dump Proxy List: ");
    for (index, proxy) in input.proxies.iter().enumerate() {
        let handles: Vec<String> = proxy.handles.iter().map(|h| h.to_string()).collect();
        let _ = writeln!(
            out,
            "  index={} pid={} uid={} proxyCount={} locks=[{}]",
            index + 1,
            proxy.pid,
            proxy.uid,
            proxy.proxy_count,
            handles.join(", ")
        );
        for (handle, sources) in &proxy.work_sources {
            let sources: Vec<String> = sources
                .iter()
                .map(|(uid, bundle)| format!("{}:{}", uid, bundle))
                .collect();
            let _ = writeln!(out, "    lock={} workSources=[{}]", handle, sources.join(" "));
        }
    }

    let _ = writeln!(out, "Peripherals Info: ");
    let _ = writeln!(
        out,
        "  Proximity: Supported={} Enabled={} Status={}",
        input.proximity.supported,
        input.proximity.enabled,
        if input.proximity.is_close { "CLOSE" } else { "AWAY" }
    );
    out
}
