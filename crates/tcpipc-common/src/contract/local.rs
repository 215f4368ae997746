use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::contract::{Dispatch, MethodTable, Reply, Serve};
use crate::protocol::error::Result;
use crate::protocol::requests::Argument;

/// Dispatches straight into an in-process service, with no transport.
///
/// Useful for exercising a contract and its proxy without a socket.
///
/// ```
/// use tcpipc_common::contract::LocalDispatch;
/// use tcpipc_common::remote_contract;
///
/// remote_contract! {
///     #[proxy(EchoProxy)]
///     pub trait Echo {
///         fn echo(&mut self, text: String) -> String;
///     }
/// }
///
/// struct Shout;
///
/// impl Echo for Shout {
///     fn echo(&mut self, text: String) -> tcpipc_common::Result<String> {
///         Ok(text.to_uppercase())
///     }
/// }
///
/// let local = LocalDispatch::new::<dyn Echo>(Shout).unwrap();
/// let mut proxy = EchoProxy::new(&local);
/// assert_eq!(proxy.echo("hi".to_string()).unwrap(), "HI");
/// ```
pub struct LocalDispatch<S> {
    service: Mutex<S>,
    table: MethodTable<S>,
}

impl<S> LocalDispatch<S> {
    pub fn new<C: Serve<S> + ?Sized>(service: S) -> Result<Self> {
        Ok(Self::with_table(service, C::method_table()?))
    }

    pub fn with_table(service: S, table: MethodTable<S>) -> Self {
        Self {
            service: Mutex::new(service),
            table,
        }
    }

    pub fn service(&self) -> MutexGuard<'_, S> {
        self.service.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn into_inner(self) -> S {
        self.service.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S> Dispatch for LocalDispatch<S> {
    fn dispatch(&self, method: &str, arguments: Vec<Argument>) -> Result<Reply> {
        let mut service = self.service();
        self.table.invoke(&mut service, method, arguments)
    }
}
