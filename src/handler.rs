/*!
 * Exception handling for facility calls
 *
 * Every call into a facility goes through [`call`], which collapses the
 * collaborator's failure modes into the [`OmeroError`] taxonomy. Deletes go
 * through [`delete`], which additionally waits a bounded time for the server
 * to finish.
 */

use omero_gateway_interface::{
    ConnectionStatus, DataManagerFacility, DeleteCallback, GatewayError, GatewayResult, ObjectRef,
    SecurityContext,
};
use tracing::{debug, warn};

use crate::config::DeleteWait;
use crate::error::{OmeroError, Result};

/// Map a collaborator failure to the taxonomy, labelled with `label`
pub fn classify(err: GatewayError, label: &str) -> OmeroError {
    let message = label.to_string();
    match err {
        GatewayError::OutOfService { status, .. } => OmeroError::Service {
            message,
            status,
            source: Some(err),
        },
        GatewayError::Facility(_) => OmeroError::Service {
            message,
            status: ConnectionStatus::ServerOutOfService,
            source: Some(err),
        },
        GatewayError::Access(_) => OmeroError::Access {
            message,
            source: Some(err),
        },
        GatewayError::Server(_) | GatewayError::LockTimeout(_) | GatewayError::Interrupted(_) => {
            OmeroError::Server {
                message,
                source: Some(err),
            }
        }
    }
}

/// Invoke `op` on `facility`, mapping any failure with `label`
///
/// Successful results are returned unchanged.
pub fn call<F, T, Op>(facility: &F, op: Op, label: &str) -> Result<T>
where
    F: ?Sized,
    Op: FnOnce(&F) -> GatewayResult<T>,
{
    op(facility).map_err(|err| {
        debug!("{}: {}", label, err);
        classify(err, label)
    })
}

/// Poll a delete completion handle within the `wait` budget
///
/// A delete still running after the last attempt is reported as a server
/// error caused by a lock timeout.
pub fn await_deletion(
    callback: &mut dyn DeleteCallback,
    wait: DeleteWait,
    label: &str,
) -> Result<()> {
    for attempt in 1..=wait.attempts() {
        match callback.block(wait.interval()) {
            Ok(true) => {
                debug!("Delete completed after {} attempt(s)", attempt);
                return Ok(());
            }
            Ok(false) => {
                debug!(
                    "Delete still running (attempt {} of {})",
                    attempt,
                    wait.attempts()
                );
            }
            Err(err) => {
                debug!("{}: {}", label, err);
                return Err(classify(err, label));
            }
        }
    }

    warn!(
        "{}: delete did not complete within {:?}",
        label,
        wait.budget()
    );

    Err(OmeroError::Server {
        message: format!("{}: thread was interrupted", label),
        source: Some(GatewayError::LockTimeout(format!(
            "lock not released after {} attempts",
            wait.attempts()
        ))),
    })
}

/// Delete `target` and wait for the server to finish
pub fn delete(
    dm: &dyn DataManagerFacility,
    ctx: &SecurityContext,
    target: ObjectRef,
    wait: DeleteWait,
    label: &str,
) -> Result<()> {
    let mut callback = call(dm, |dm| dm.delete(ctx, target), label)?;
    await_deletion(callback.as_mut(), wait, label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::time::Duration;

    /// Handle that finishes after a fixed number of polls
    struct CountingCallback {
        polls: u32,
        finish_after: Option<u32>,
        fail_with: Option<GatewayError>,
    }

    impl DeleteCallback for CountingCallback {
        fn block(&mut self, _timeout: Duration) -> GatewayResult<bool> {
            self.polls += 1;
            if let Some(err) = self.fail_with.clone() {
                return Err(err);
            }
            Ok(self.finish_after.is_some_and(|n| self.polls >= n))
        }
    }

    fn quick_wait() -> DeleteWait {
        DeleteWait::new(10, Duration::from_millis(1))
    }

    #[test]
    fn test_classify_out_of_service() {
        let err = classify(
            GatewayError::out_of_service("refused", ConnectionStatus::Network),
            "Cannot connect to OMERO",
        );
        assert_eq!(err.kind(), ErrorKind::Service);
        assert_eq!(err.connection_status(), Some(ConnectionStatus::Network));
        assert_eq!(err.to_string(), "Cannot connect to OMERO (connection status: network)");
    }

    #[test]
    fn test_classify_access_and_server() {
        let err = classify(GatewayError::Access("denied".to_string()), "Cannot get projects");
        assert_eq!(err.kind(), ErrorKind::Access);
        assert_eq!(err.to_string(), "Cannot get projects");

        let err = classify(GatewayError::Server("boom".to_string()), "Cannot get tags");
        assert_eq!(err.kind(), ErrorKind::Server);
    }

    #[test]
    fn test_classify_keeps_interruption_as_cause() {
        let err = classify(GatewayError::Interrupted("cancelled".to_string()), "label");
        assert_eq!(err.kind(), ErrorKind::Server);
        assert!(err.is_interrupted());
    }

    #[test]
    fn test_classify_facility() {
        let err = classify(GatewayError::Facility("no roi".to_string()), "label");
        assert_eq!(err.kind(), ErrorKind::Service);
    }

    #[test]
    fn test_call_passes_success_through() {
        let value = call(&41, |n: &i32| Ok(n + 1), "unused").unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_call_maps_failure() {
        let result: Result<()> = call(
            &(),
            |_| Err(GatewayError::Access("nope".to_string())),
            "Cannot access data",
        );
        assert!(matches!(result, Err(OmeroError::Access { .. })));
    }

    #[test]
    fn test_await_deletion_completes() {
        let mut callback = CountingCallback {
            polls: 0,
            finish_after: Some(3),
            fail_with: None,
        };
        await_deletion(&mut callback, quick_wait(), "Cannot delete").unwrap();
        assert_eq!(callback.polls, 3);
    }

    #[test]
    fn test_await_deletion_exhausts_budget() {
        let mut callback = CountingCallback {
            polls: 0,
            finish_after: None,
            fail_with: None,
        };
        let err = await_deletion(&mut callback, quick_wait(), "Cannot delete").unwrap_err();

        assert_eq!(callback.polls, 10);
        assert_eq!(err.kind(), ErrorKind::Server);
        assert!(matches!(
            err.gateway_cause(),
            Some(GatewayError::LockTimeout(_))
        ));
        assert!(!err.is_interrupted());
    }

    #[test]
    fn test_await_deletion_rejected() {
        let mut callback = CountingCallback {
            polls: 0,
            finish_after: None,
            fail_with: Some(GatewayError::Access("not owner".to_string())),
        };
        let err = await_deletion(&mut callback, quick_wait(), "Cannot delete").unwrap_err();

        assert_eq!(callback.polls, 1);
        assert_eq!(err.kind(), ErrorKind::Access);
    }
}
