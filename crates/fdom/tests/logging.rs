//! Global subscriber installation. Runs in its own test binary so the
//! process-wide subscriber is not shared with other suites.

use fdom::logging::{LogConfig, LoggingError, init_logging};

#[test]
fn installs_once() {
    let config = LogConfig::default().directive("fdom=debug,warn");
    assert!(matches!(init_logging(&config), Ok(true)));
    assert!(matches!(
        init_logging(&config),
        Err(LoggingError::AlreadyInstalled(_))
    ));
}
