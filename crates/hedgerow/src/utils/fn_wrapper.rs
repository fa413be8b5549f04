// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Generates a cloneable, thread-safe wrapper around a user-supplied closure.
///
/// The wrapper stores the closure in an `Arc<dyn Fn ...>` so that builders and services can be
/// cloned cheaply while sharing the same callback.
///
/// ```rust,ignore
/// define_fn_wrapper!(IsEnabled<In>(Fn(input: &In) -> bool));
/// ```
///
/// The generated type exposes `new(f)`, `call(args...)` and implements `Clone` and `Debug`.
/// A unit return type must be spelled out as `-> ()`.
macro_rules! define_fn_wrapper {
    ($name:ident<$($generic:ident),*>(Fn($($arg:ident: $arg_ty:ty),*) -> $ret:ty)) => {
        pub(crate) struct $name<$($generic),*>(std::sync::Arc<dyn Fn($($arg_ty),*) -> $ret + Send + Sync>);

        impl<$($generic),*> $name<$($generic),*> {
            pub(crate) fn new(f: impl Fn($($arg_ty),*) -> $ret + Send + Sync + 'static) -> Self {
                Self(std::sync::Arc::new(f))
            }

            pub(crate) fn call(&self, $($arg: $arg_ty),*) -> $ret {
                (self.0)($($arg),*)
            }
        }

        impl<$($generic),*> Clone for $name<$($generic),*> {
            fn clone(&self) -> Self {
                Self(std::sync::Arc::clone(&self.0))
            }
        }

        impl<$($generic),*> std::fmt::Debug for $name<$($generic),*> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(stringify!($name))
            }
        }
    };
}

pub(crate) use define_fn_wrapper;
