//! Type-erased callback handles.
//!
//! A registered callable keeps its concrete argument types inside a
//! [`TypedCallback`]. The registry only ever sees the erased
//! [`CallbackHandle`] interface: "decode these bytes, then invoke".
//!
//! # Supported callables
//!
//! Anything implementing `Fn(A1, .., An) + 'static` for `n <= 8`, where every
//! argument is serde-serializable: free functions, function pointers and
//! closures with captured state. The argument list travels as the tuple
//! `(A1, .., An)`; see [`Arguments`].

use std::any::Any;

use lockstep_core::{CodecError, MessageCodec};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A fixed-arity argument tuple that can cross the wire.
///
/// Implemented for tuples of up to eight serializable values, including the
/// empty tuple for zero-argument callbacks.
pub trait Arguments: Serialize + DeserializeOwned + 'static {
    /// Number of arguments in the tuple.
    const ARITY: usize;
}

/// A callable invocable with the argument tuple `Args`.
///
/// Blanket-implemented for every `Fn` of matching signature, so
/// `|i: i32, d: f64| ..` is a `Callback<(i32, f64)>`.
pub trait Callback<Args>: 'static {
    /// Invoke with an unpacked argument tuple.
    fn call(&self, args: Args);
}

macro_rules! impl_arguments {
    ($arity:expr; $($ty:ident),*) => {
        impl<$($ty,)*> Arguments for ($($ty,)*)
        where
            $($ty: Serialize + DeserializeOwned + 'static,)*
        {
            const ARITY: usize = $arity;
        }

        impl<F, $($ty,)*> Callback<($($ty,)*)> for F
        where
            F: Fn($($ty),*) + 'static,
        {
            #[allow(non_snake_case)]
            fn call(&self, ($($ty,)*): ($($ty,)*)) {
                self($($ty),*)
            }
        }
    };
}

impl_arguments!(0;);
impl_arguments!(1; A1);
impl_arguments!(2; A1, A2);
impl_arguments!(3; A1, A2, A3);
impl_arguments!(4; A1, A2, A3, A4);
impl_arguments!(5; A1, A2, A3, A4, A5);
impl_arguments!(6; A1, A2, A3, A4, A5, A6);
impl_arguments!(7; A1, A2, A3, A4, A5, A6, A7);
impl_arguments!(8; A1, A2, A3, A4, A5, A6, A7, A8);

/// Erased interface stored by the registry.
///
/// Handles hold no state between invocations beyond the wrapped callable.
pub trait CallbackHandle<K: MessageCodec> {
    /// Decode the argument tuple from `payload`, then invoke the callable.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Decode` if `payload` is not exactly one encoded
    /// argument tuple of this handle's signature. The callable is not invoked
    /// in that case.
    fn invoke(&self, codec: &K, payload: &[u8]) -> Result<(), CodecError>;

    /// Number of arguments the callable takes.
    fn arity(&self) -> usize;

    /// Type name of the argument tuple, for diagnostics.
    fn signature(&self) -> &'static str;

    /// Access to the concrete handle for local, non-serialized invocation.
    fn as_any(&self) -> &dyn Any;
}

/// Concrete handle for one argument signature.
pub struct TypedCallback<Args> {
    callable: Box<dyn Callback<Args>>,
}

impl<Args: Arguments> TypedCallback<Args> {
    /// Wrap a callable.
    pub fn new<F>(callable: F) -> Self
    where
        F: Callback<Args>,
    {
        Self {
            callable: Box::new(callable),
        }
    }

    /// Invoke directly with already-decoded arguments.
    pub fn call(&self, args: Args) {
        self.callable.call(args);
    }
}

impl<Args, K> CallbackHandle<K> for TypedCallback<Args>
where
    Args: Arguments,
    K: MessageCodec,
{
    fn invoke(&self, codec: &K, payload: &[u8]) -> Result<(), CodecError> {
        let args: Args = codec.decode(payload)?;
        self.callable.call(args);
        Ok(())
    }

    fn arity(&self) -> usize {
        Args::ARITY
    }

    fn signature(&self) -> &'static str {
        std::any::type_name::<Args>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<Args> std::fmt::Debug for TypedCallback<Args> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedCallback")
            .field("signature", &std::any::type_name::<Args>())
            .finish()
    }
}
