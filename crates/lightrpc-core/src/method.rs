use crate::params::Params;

/// A callable RPC method: a params struct that also knows its wire name.
///
/// The same type is used by clients to build requests and by servers to
/// decode them.
pub trait Method: Params + Send + Sync + 'static {
    fn name(&self) -> &str;
}
