// src/payload/switcher.rs

//! Installation source switching
//!
//! All calls drive backend tasks synchronously on the caller's thread. None
//! of them start a newly attached source; that is the next preparation
//! run's job.

use tracing::{debug, info};

use super::backend::PayloadBackend;
use super::source::{SourceHandle, SourceSetupError, SourceType};
use crate::task::sync_run_task;

/// Replace every attached source with a fresh source of `new_type`
pub fn switch_source(
    payload: &dyn PayloadBackend,
    new_type: SourceType,
) -> Result<SourceHandle, SourceSetupError> {
    info!("Switching installation source to {}", new_type);
    tear_down_sources(payload)?;

    let source = payload.create_source(new_type)?;
    payload.set_sources(vec![source.clone()])?;
    debug!("Attached {}", source);
    Ok(source)
}

/// Set up every attached source and wait for it
pub fn set_up_sources(payload: &dyn PayloadBackend) -> Result<(), SourceSetupError> {
    let mut task = payload.set_up_sources_task();
    sync_run_task(task.as_mut())
}

/// Tear down every attached source and wait for it
pub fn tear_down_sources(payload: &dyn PayloadBackend) -> Result<(), SourceSetupError> {
    let mut task = payload.tear_down_sources_task();
    sync_run_task(task.as_mut())
}

/// First attached source
///
/// With `default_type`, a payload without sources gets one of that type
/// attached first.
pub fn get_source(
    payload: &dyn PayloadBackend,
    default_type: Option<SourceType>,
) -> Result<Option<SourceHandle>, SourceSetupError> {
    if let Some(source) = payload.sources().into_iter().next() {
        return Ok(Some(source));
    }

    let Some(source_type) = default_type else {
        return Ok(None);
    };

    debug!("No source attached, creating default {} source", source_type);
    let source = payload.create_source(source_type)?;
    payload.set_sources(vec![source.clone()])?;
    Ok(Some(source))
}

/// Type of the active source, if any
pub fn current_source_type(payload: &dyn PayloadBackend) -> Option<SourceType> {
    payload
        .sources()
        .first()
        .map(SourceHandle::source_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{PayloadKind, SimulatedPayload};

    #[test]
    fn test_switch_source_replaces_all() {
        let payload = SimulatedPayload::new(PayloadKind::Dnf)
            .with_sources(&[SourceType::Cdrom, SourceType::Url]);
        set_up_sources(&payload).unwrap();

        let source = switch_source(&payload, SourceType::Cdn).unwrap();

        assert_eq!(source.source_type(), SourceType::Cdn);
        assert_eq!(payload.sources(), vec![source]);
        // The new source is attached but not started
        assert!(!payload.sources_ready());
    }

    #[test]
    fn test_tear_down_then_set_up_keeps_type() {
        let payload = SimulatedPayload::new(PayloadKind::Dnf).with_sources(&[SourceType::Nfs]);
        set_up_sources(&payload).unwrap();
        assert!(payload.sources_ready());

        tear_down_sources(&payload).unwrap();
        assert!(!payload.sources_ready());
        set_up_sources(&payload).unwrap();

        assert!(payload.sources_ready());
        assert_eq!(current_source_type(&payload), Some(SourceType::Nfs));
    }

    #[test]
    fn test_get_source_creates_default() {
        let payload = SimulatedPayload::new(PayloadKind::Dnf);
        assert_eq!(get_source(&payload, None).unwrap(), None);

        let source = get_source(&payload, Some(SourceType::ClosestMirror))
            .unwrap()
            .unwrap();
        assert_eq!(source.source_type(), SourceType::ClosestMirror);

        // Existing source wins over the default
        let again = get_source(&payload, Some(SourceType::Cdrom)).unwrap().unwrap();
        assert_eq!(again, source);
    }

    #[test]
    fn test_set_up_failure_reported() {
        let payload = SimulatedPayload::new(PayloadKind::Dnf)
            .with_sources(&[SourceType::Hdd])
            .fail_source_setup("device sdb1 not found");

        let err = set_up_sources(&payload).unwrap_err();
        assert_eq!(err, SourceSetupError::SetUp("device sdb1 not found".to_string()));
    }

    #[test]
    fn test_unsupported_source_type() {
        let payload = SimulatedPayload::new(PayloadKind::RpmOstree);
        let err = switch_source(&payload, SourceType::Cdn).unwrap_err();
        assert_eq!(err, SourceSetupError::Unsupported(SourceType::Cdn));
    }
}
