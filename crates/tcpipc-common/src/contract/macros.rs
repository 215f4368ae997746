/// Declares a remote contract.
///
/// The leading `#[proxy(Name)]` names the generated proxy type. Every method
/// takes `&mut self` plus positional arguments; arguments and return values
/// must be serde types, except that a method may return
/// [`BulkPayload`](crate::contract::BulkPayload) to stream bytes. Each
/// declared return type `T` becomes `Result<T>` in the generated trait, and
/// a missing return type becomes `Result<()>`.
///
/// ```
/// use tcpipc_common::contract::{create_proxy, LocalDispatch, RemoteContract};
/// use tcpipc_common::remote_contract;
///
/// remote_contract! {
///     #[proxy(CounterProxy)]
///     pub trait Counter {
///         fn bump(&mut self, by: u32) -> u32;
///         fn reset(&mut self);
///     }
/// }
///
/// #[derive(Default)]
/// struct Tally(u32);
///
/// impl Counter for Tally {
///     fn bump(&mut self, by: u32) -> tcpipc_common::Result<u32> {
///         self.0 += by;
///         Ok(self.0)
///     }
///
///     fn reset(&mut self) -> tcpipc_common::Result<()> {
///         self.0 = 0;
///         Ok(())
///     }
/// }
///
/// assert_eq!(<dyn Counter as RemoteContract>::NAME, "Counter");
///
/// let local = LocalDispatch::new::<dyn Counter>(Tally::default()).unwrap();
/// let mut counter = create_proxy::<dyn Counter, _>(&local);
/// assert_eq!(counter.bump(2).unwrap(), 2);
/// assert_eq!(counter.bump(3).unwrap(), 5);
/// counter.reset().unwrap();
/// assert_eq!(local.service().0, 0);
/// ```
#[macro_export]
macro_rules! remote_contract {
    (
        #[proxy($proxy:ident)]
        $(#[$attr:meta])*
        $vis:vis trait $name:ident {
            $(
                $(#[$method_attr:meta])*
                fn $method:ident(&mut self $(, $arg:ident : $arg_ty:ty)*) $(-> $ret:ty)?;
            )*
        }
    ) => {
        $(#[$attr])*
        $vis trait $name {
            $(
                $(#[$method_attr])*
                fn $method(&mut self $(, $arg: $arg_ty)*)
                    -> $crate::Result<$crate::__contract_return!($($ret)?)>;
            )*
        }

        impl $crate::contract::RemoteContract for dyn $name {
            const NAME: &'static str = ::std::stringify!($name);

            fn signatures() -> &'static [$crate::contract::MethodSignature] {
                const SIGNATURES: &[$crate::contract::MethodSignature] = &[
                    $(
                        $crate::contract::MethodSignature {
                            name: ::std::stringify!($method),
                            params: &[$(::std::stringify!($arg_ty)),*],
                            returns: $crate::__contract_return_name!($($ret)?),
                        },
                    )*
                ];
                SIGNATURES
            }
        }

        impl<S: $name + 'static> $crate::contract::Serve<S> for dyn $name {
            fn method_table() -> $crate::Result<$crate::contract::MethodTable<S>> {
                $crate::contract::MethodTable::builder(
                    <dyn $name as $crate::contract::RemoteContract>::NAME,
                )
                $(
                    .method(
                        ::std::stringify!($method),
                        |service: &mut S, arguments: ::std::vec::Vec<$crate::protocol::Argument>| {
                            #[allow(unused_mut)]
                            let mut _arguments = $crate::contract::Arguments::new(
                                ::std::stringify!($method),
                                arguments,
                                <[&str]>::len(&[$(::std::stringify!($arg)),*]),
                            )?;
                            let value = <S as $name>::$method(
                                service
                                $(, _arguments.next::<$arg_ty>(::std::stringify!($arg))?)*
                            )?;
                            $crate::contract::Reply::from_return(value)
                        },
                    )
                )*
                .build()
            }
        }

        #[doc = ::std::concat!(
            "Forwards every `", ::std::stringify!($name), "` call through a `Dispatch`."
        )]
        $vis struct $proxy<D> {
            dispatch: D,
        }

        impl<D> $proxy<D> {
            pub fn new(dispatch: D) -> Self {
                Self { dispatch }
            }

            pub fn get_ref(&self) -> &D {
                &self.dispatch
            }

            pub fn into_inner(self) -> D {
                self.dispatch
            }
        }

        impl<D: $crate::contract::Dispatch> $name for $proxy<D> {
            $(
                fn $method(&mut self $(, $arg: $arg_ty)*)
                    -> $crate::Result<$crate::__contract_return!($($ret)?)>
                {
                    let arguments: ::std::vec::Vec<$crate::protocol::Argument> =
                        ::std::vec![$($crate::contract::argument(&$arg)?),*];
                    $crate::contract::forward(&self.dispatch, ::std::stringify!($method), arguments)
                }
            )*
        }

        impl<D: $crate::contract::Dispatch> $crate::contract::ProxyFactory<D> for dyn $name {
            type Proxy = $proxy<D>;

            fn create_proxy(dispatch: D) -> Self::Proxy {
                $proxy::new(dispatch)
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __contract_return {
    () => { () };
    ($ret:ty) => { $ret };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __contract_return_name {
    () => { "()" };
    ($ret:ty) => { ::std::stringify!($ret) };
}
