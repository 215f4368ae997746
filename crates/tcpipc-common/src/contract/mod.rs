//! Remote contracts and the glue between them and a transport.
//!
//! A contract is a trait declared through [`remote_contract!`]. The macro
//! produces the trait itself, a proxy type that implements it by forwarding
//! every call through a [`Dispatch`], and the server-side [`MethodTable`]
//! that routes incoming calls back onto a concrete service. The contract is
//! named by its trait object type, e.g. `dyn Calculator`.
//!
//! [`remote_contract!`]: crate::remote_contract

mod finite;
mod local;
mod macros;
mod reply;
mod table;


use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::error::{Result, TcpipcError};
use crate::protocol::requests::Argument;

pub use local::LocalDispatch;
pub use reply::{BulkPayload, Reply};
pub use table::{Arguments, Handler, MethodTable, MethodTableBuilder};

/// Shape of one method as declared in a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSignature {
    pub name: &'static str,
    pub params: &'static [&'static str],
    pub returns: &'static str,
}

impl MethodSignature {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Static description of a contract.
pub trait RemoteContract {
    const NAME: &'static str;

    fn signatures() -> &'static [MethodSignature];

    fn signature(method: &str) -> Option<&'static MethodSignature> {
        Self::signatures().iter().find(|s| s.name == method)
    }
}

/// Sends one call somewhere and brings back its reply.
///
/// Implemented by the network client and by [`LocalDispatch`].
pub trait Dispatch {
    fn dispatch(&self, method: &str, arguments: Vec<Argument>) -> Result<Reply>;
}

impl<D: Dispatch + ?Sized> Dispatch for &D {
    fn dispatch(&self, method: &str, arguments: Vec<Argument>) -> Result<Reply> {
        (**self).dispatch(method, arguments)
    }
}

impl<D: Dispatch + ?Sized> Dispatch for Arc<D> {
    fn dispatch(&self, method: &str, arguments: Vec<Argument>) -> Result<Reply> {
        (**self).dispatch(method, arguments)
    }
}

impl<D: Dispatch + ?Sized> Dispatch for Box<D> {
    fn dispatch(&self, method: &str, arguments: Vec<Argument>) -> Result<Reply> {
        (**self).dispatch(method, arguments)
    }
}

/// Contracts that can be served by `S`.
pub trait Serve<S>: RemoteContract {
    fn method_table() -> Result<MethodTable<S>>;
}

/// Contracts that can produce a proxy over `D`.
pub trait ProxyFactory<D: Dispatch>: RemoteContract {
    type Proxy;

    fn create_proxy(dispatch: D) -> Self::Proxy;
}

/// Builds the proxy of contract `C` over `dispatch`.
///
/// The proxy type is generated at compile time, so repeated calls only
/// construct a new wrapper.
pub fn create_proxy<C, D>(dispatch: D) -> C::Proxy
where
    C: ProxyFactory<D> + ?Sized,
    D: Dispatch,
{
    C::create_proxy(dispatch)
}

/// Encodes one call argument. Non-finite floats are rejected.
pub fn argument<T: Serialize + ?Sized>(value: &T) -> Result<Argument> {
    finite::to_value(value)
        .map_err(|e| TcpipcError::Conversion(format!("cannot encode argument: {}", e)))
}

/// Dispatches a call and converts its reply to the declared return type.
pub fn forward<D, R>(dispatch: &D, method: &str, arguments: Vec<Argument>) -> Result<R>
where
    D: Dispatch + ?Sized,
    R: DeserializeOwned + 'static,
{
    dispatch.dispatch(method, arguments)?.into_return()
}
