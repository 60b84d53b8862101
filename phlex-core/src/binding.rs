//! Typed argument binding between stores and user callables.
//!
//! User algorithms are plain Rust closures with typed parameters. The
//! binding layer resolves each declared input product to the store that
//! carries it and converts the type-erased value into the parameter type.
//!
//! Two binding modes interoperate on the same product:
//!
//! - **plain value** — the parameter type is the product type itself and
//!   receives a dereferenced copy. Implemented for the standard scalar
//!   types, `String`, and `Vec<T>`/`HashMap<K, V>` of such values.
//! - **[`Handle<T>`]** — the parameter receives a shared accessor exposing
//!   the value and the store it was resolved from. Works for any product
//!   type without cloning.
//!
//! Custom plain-value bindings can be added by implementing [`FromSlot`]
//! for the product type.

use crate::error::{Error, Result};
use phlex_model::{Handle, ProductStore, Products};
use std::collections::HashMap;
use std::sync::Arc;

/// The resolved inputs of one node invocation.
///
/// Slot `i` holds the `i`-th declared input product's name and the store
/// that carries it.
pub struct InputSlots {
    entries: Vec<(String, Arc<ProductStore>)>,
}

impl InputSlots {
    pub(crate) fn new(entries: Vec<(String, Arc<ProductStore>)>) -> Self {
        Self { entries }
    }

    /// The number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether there are no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The product name bound to slot `index`.
    #[must_use]
    pub fn name(&self, index: usize) -> &str {
        &self.entries[index].0
    }

    /// The store carrying the product bound to slot `index`.
    #[must_use]
    pub fn store(&self, index: usize) -> &Arc<ProductStore> {
        &self.entries[index].1
    }
}

/// Conversion from a resolved input slot to a callable parameter.
pub trait FromSlot: Sized {
    /// Extract the parameter value from slot `index`.
    fn from_slot(slots: &InputSlots, index: usize) -> Result<Self>;
}

fn clone_from_slot<T: Clone + Send + Sync + 'static>(
    slots: &InputSlots,
    index: usize,
) -> Result<T> {
    Ok(slots
        .store(index)
        .get::<T>(slots.name(index))
        .map(Clone::clone)?)
}

macro_rules! impl_plain_from_slot {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromSlot for $ty {
                fn from_slot(slots: &InputSlots, index: usize) -> Result<Self> {
                    clone_from_slot(slots, index)
                }
            }
        )*
    };
}

impl_plain_from_slot!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, String,
);

impl<T: Clone + Send + Sync + 'static> FromSlot for Vec<T> {
    fn from_slot(slots: &InputSlots, index: usize) -> Result<Self> {
        clone_from_slot(slots, index)
    }
}

impl<K, V> FromSlot for HashMap<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn from_slot(slots: &InputSlots, index: usize) -> Result<Self> {
        clone_from_slot(slots, index)
    }
}

impl<T: Send + Sync + 'static> FromSlot for Handle<T> {
    fn from_slot(slots: &InputSlots, index: usize) -> Result<Self> {
        Ok(slots.store(index).handle::<T>(slots.name(index))?)
    }
}

/// Conversion from a callable's return value into output products.
pub trait IntoProducts {
    /// The number of output products produced.
    const ARITY: usize;

    /// Attach the value(s) under the given output names.
    fn into_products(self, names: &[String]) -> Products;
}

macro_rules! impl_single_into_products {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoProducts for $ty {
                const ARITY: usize = 1;

                fn into_products(self, names: &[String]) -> Products {
                    let mut products = Products::new();
                    products.add(names[0].clone(), self);
                    products
                }
            }
        )*
    };
}

impl_single_into_products!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, String,
);

impl<T: Send + Sync + 'static> IntoProducts for Vec<T> {
    const ARITY: usize = 1;

    fn into_products(self, names: &[String]) -> Products {
        let mut products = Products::new();
        products.add(names[0].clone(), self);
        products
    }
}

macro_rules! impl_tuple_into_products {
    ($count:expr => $($idx:tt $ty:ident),+) => {
        impl<$($ty: Send + Sync + 'static),+> IntoProducts for ($($ty,)+) {
            const ARITY: usize = $count;

            fn into_products(self, names: &[String]) -> Products {
                let mut products = Products::new();
                $(products.add(names[$idx].clone(), self.$idx);)+
                products
            }
        }
    };
}

impl_tuple_into_products!(1 => 0 A);
impl_tuple_into_products!(2 => 0 A, 1 B);
impl_tuple_into_products!(3 => 0 A, 1 B, 2 C);
impl_tuple_into_products!(4 => 0 A, 1 B, 2 C, 3 D);

/// A transform callable with typed parameters.
///
/// Implemented for closures of one to eight [`FromSlot`] parameters
/// returning an [`IntoProducts`] value.
pub trait TransformFn<Args>: Send + Sync + 'static {
    /// The number of input parameters.
    const ARITY: usize;
    /// The return type, convertible into output products.
    type Out: IntoProducts;

    /// Invoke the callable against resolved inputs.
    fn call(&self, slots: &InputSlots) -> Result<Self::Out>;
}

/// An observer callable with typed parameters and no outputs.
pub trait ObserveFn<Args>: Send + Sync + 'static {
    /// The number of input parameters.
    const ARITY: usize;

    /// Invoke the callable against resolved inputs.
    fn call(&self, slots: &InputSlots) -> Result<()>;
}

/// A reducer update callable: mutable accumulator plus typed parameters.
pub trait ReduceFn<Acc, Args>: Send + Sync + 'static {
    /// The number of input parameters (excluding the accumulator).
    const ARITY: usize;

    /// Fold one child's products into the accumulator.
    fn call(&self, acc: &mut Acc, slots: &InputSlots) -> Result<()>;
}

macro_rules! impl_callables {
    ($count:expr => $($idx:tt $ty:ident),+) => {
        impl<F, O, $($ty),+> TransformFn<($($ty,)+)> for F
        where
            F: Fn($($ty),+) -> O + Send + Sync + 'static,
            O: IntoProducts,
            $($ty: FromSlot,)+
        {
            const ARITY: usize = $count;
            type Out = O;

            fn call(&self, slots: &InputSlots) -> Result<O> {
                Ok((self)($($ty::from_slot(slots, $idx)?),+))
            }
        }

        impl<F, $($ty),+> ObserveFn<($($ty,)+)> for F
        where
            F: Fn($($ty),+) + Send + Sync + 'static,
            $($ty: FromSlot,)+
        {
            const ARITY: usize = $count;

            fn call(&self, slots: &InputSlots) -> Result<()> {
                (self)($($ty::from_slot(slots, $idx)?),+);
                Ok(())
            }
        }

        impl<F, Acc, $($ty),+> ReduceFn<Acc, ($($ty,)+)> for F
        where
            F: Fn(&mut Acc, $($ty),+) + Send + Sync + 'static,
            Acc: 'static,
            $($ty: FromSlot,)+
        {
            const ARITY: usize = $count;

            fn call(&self, acc: &mut Acc, slots: &InputSlots) -> Result<()> {
                (self)(acc, $($ty::from_slot(slots, $idx)?),+);
                Ok(())
            }
        }
    };
}

impl_callables!(1 => 0 A);
impl_callables!(2 => 0 A, 1 B);
impl_callables!(3 => 0 A, 1 B, 2 C);
impl_callables!(4 => 0 A, 1 B, 2 C, 3 D);
impl_callables!(5 => 0 A, 1 B, 2 C, 3 D, 4 E);
impl_callables!(6 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 G);
impl_callables!(7 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 G, 6 H);
impl_callables!(8 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 G, 6 H, 7 I);

/// Run a user algorithm, converting panics into algorithm errors.
pub(crate) fn catch_algorithm<R>(node: &str, f: impl FnOnce() -> Result<R>) -> Result<R> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let cause = payload
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "algorithm panicked".to_string());
            Err(Error::Algorithm {
                node: node.to_string(),
                cause,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phlex_model::ModelError;

    fn slots_with(products: &[(&str, i32)]) -> InputSlots {
        let mut store = ProductStore::base();
        for (name, value) in products {
            store.add_product(*name, *value);
        }
        let store = Arc::new(store);
        InputSlots::new(
            products
                .iter()
                .map(|(name, _)| ((*name).to_string(), Arc::clone(&store)))
                .collect(),
        )
    }

    #[test]
    fn plain_value_binding() {
        let slots = slots_with(&[("a", 3)]);
        let f = |a: i32| a + 1;
        let out = TransformFn::call(&f, &slots).unwrap();
        assert_eq!(out, 4);
    }

    #[test]
    fn handle_binding_interoperates() {
        let slots = slots_with(&[("a", 3)]);
        let f = |a: Handle<i32>| *a + 1;
        let out = TransformFn::call(&f, &slots).unwrap();
        assert_eq!(out, 4);
    }

    #[test]
    fn multi_argument_binding() {
        let slots = slots_with(&[("i", 1), ("j", 0)]);
        let f = |i: i32, j: i32| i + j;
        let out = TransformFn::call(&f, &slots).unwrap();
        assert_eq!(out, 1);
    }

    #[test]
    fn type_mismatch_propagates() {
        let slots = slots_with(&[("a", 3)]);
        let f = |a: f64| a;
        let err = TransformFn::call(&f, &slots).unwrap_err();
        assert!(matches!(
            err,
            Error::Model(ModelError::ProductTypeMismatch { .. })
        ));
    }

    #[test]
    fn tuple_outputs_attach_in_order() {
        let names = vec!["x".to_string(), "y".to_string()];
        let products = (1_i32, 2.5_f64).into_products(&names);
        assert_eq!(*products.get::<i32>("x").unwrap(), 1);
        assert_eq!(*products.get::<f64>("y").unwrap(), 2.5);
        assert_eq!(<(i32, f64) as IntoProducts>::ARITY, 2);
    }

    #[test]
    fn reduce_binding_folds() {
        let slots = slots_with(&[("x", 5)]);
        let f = |acc: &mut i64, x: i32| *acc += i64::from(x);
        let mut acc = 0_i64;
        ReduceFn::call(&f, &mut acc, &slots).unwrap();
        ReduceFn::call(&f, &mut acc, &slots).unwrap();
        assert_eq!(acc, 10);
    }

    #[test]
    fn panics_become_algorithm_errors() {
        let err = catch_algorithm("boomer", || -> Result<()> { panic!("kaboom") }).unwrap_err();
        match err {
            Error::Algorithm { node, cause } => {
                assert_eq!(node, "boomer");
                assert!(cause.contains("kaboom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
