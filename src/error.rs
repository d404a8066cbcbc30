use thiserror::Error;

/// Failure to reach the value behind a handle.
///
/// Both variants are logic errors in the calling code. A weak handle that can no longer be
/// upgraded is not an error; `WeakHandle::upgrade` returns `None` for it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleError {
    /// The handle holds no value: it was transferred from, reset, or created empty.
    #[error("handle is empty")]
    EmptyHandle,

    /// The handle points at a control block whose payload was already destroyed.
    #[error("handle refers to a destroyed value")]
    DanglingAccess,
}
