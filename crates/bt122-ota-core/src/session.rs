//! Connection ownership
//!
//! A [`Session`] owns at most one open transport. Opening a second one while
//! the first is still active is refused instead of silently replacing it.

use crate::error::{OtaError, Result};
use crate::transport::{BoxedTransport, Transport};

/// Holder of the single active connection
#[derive(Default)]
pub struct Session {
    active: Option<BoxedTransport>,
}

impl Session {
    /// Session with no connection
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a connection is open
    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    /// Open a connection with `connect`
    ///
    /// `connect` is not called at all when a connection is already open.
    pub fn open<F>(&mut self, connect: F) -> Result<&mut BoxedTransport>
    where
        F: FnOnce() -> Result<BoxedTransport>,
    {
        if let Some(existing) = &self.active {
            return Err(OtaError::Connection(format!(
                "{} is already open",
                existing.describe()
            )));
        }
        let transport = connect()?;
        log::info!("Connected to {}", transport.describe());
        Ok(self.active.insert(transport))
    }

    /// The open connection
    pub fn transport(&mut self) -> Result<&mut BoxedTransport> {
        self.active
            .as_mut()
            .ok_or_else(|| OtaError::Connection("no connection is open".into()))
    }

    /// Close the open connection, if any
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut transport) = self.active.take() {
            log::debug!("Closing {}", transport.describe());
            transport.close()?;
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to close connection: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::ScriptedTransport;

    #[test]
    fn test_second_open_is_rejected() {
        let mut session = Session::new();
        session
            .open(|| Ok(Box::new(ScriptedTransport::new())))
            .unwrap();
        assert!(session.is_open());

        let mut called = false;
        let err = session
            .open(|| {
                called = true;
                Ok(Box::new(ScriptedTransport::new()))
            })
            .err()
            .expect("second open must fail");
        assert!(matches!(err, OtaError::Connection(_)));
        assert!(!called);
    }

    #[test]
    fn test_close_then_reopen() {
        let mut session = Session::new();
        session
            .open(|| Ok(Box::new(ScriptedTransport::new())))
            .unwrap();
        session.close().unwrap();
        assert!(!session.is_open());
        assert!(session.transport().is_err());
        session
            .open(|| Ok(Box::new(ScriptedTransport::new())))
            .unwrap();
        assert!(session.transport().is_ok());
    }

    #[test]
    fn test_failed_connect_leaves_session_closed() {
        let mut session = Session::new();
        let err = session
            .open(|| Err(OtaError::Connection("no such port".into())))
            .err()
            .expect("connect failure must propagate");
        assert!(matches!(err, OtaError::Connection(_)));
        assert!(!session.is_open());
    }
}
