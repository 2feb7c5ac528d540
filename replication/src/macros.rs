//! Macros for building [`crate::error::ReplicationError`] values.

/// Creates a [`crate::error::ReplicationError`] from an error kind and a static description.
///
/// A dynamic detail and a source error can optionally be attached. Use `detail =` to move an
/// owned [`String`] instead of formatting it again.
#[macro_export]
macro_rules! replication_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::ReplicationError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::ReplicationError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        $crate::error::ReplicationError::from(($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr, source: $source:expr) => {
        $crate::error::ReplicationError::from(($kind, $desc, $detail)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::ReplicationError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::ReplicationError::from(($kind, $desc, $detail.to_string()))
            .with_source($source)
    };
}

/// Returns early with a [`crate::error::ReplicationError`].
///
/// Accepts the same arguments as [`replication_error!`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::replication_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::replication_error!($kind, $desc, source: $source))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        return ::core::result::Result::Err($crate::replication_error!(
            $kind,
            $desc,
            detail = $detail
        ))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::replication_error!(
            $kind,
            $desc,
            detail = $detail,
            source: $source
        ))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::replication_error!($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::replication_error!(
            $kind,
            $desc,
            $detail,
            source: $source
        ))
    };
}
