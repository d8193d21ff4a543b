// Oryx Method Objects
// A method is an executable body plus the scope it was defined in and its
// access flags. Scope is fixed once assigned; rescoping makes a new method.

use super::caller::{Activation, Executable, NativeBody, NativeMethodFn};
use super::class::ClassId;
use super::gc::Marker;
use super::value::Value;
use super::vm::{PackageId, VM};
use crate::arena::Id;
use crate::error::{ErrorKind, OryxError, OryxResult};
use std::fmt;
use std::sync::Arc;

pub type MethodId = Id<Method>;

/// Method attribute flags
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MethodFlags(pub u8);

impl MethodFlags {
    pub const NONE: Self = Self(0);

    /// Only callable from the defining scope (or instances of it)
    pub const PRIVATE: Self = Self(1 << 0);

    /// Runs without acquiring the object guard
    pub const UNGUARDED: Self = Self(1 << 1);

    /// Checked with the security manager before running
    pub const PROTECTED: Self = Self(1 << 2);

    /// Only callable from the defining package
    pub const PACKAGE: Self = Self(1 << 3);

    pub const ATTRIBUTE: Self = Self(1 << 4);
    pub const CONSTANT: Self = Self(1 << 5);
    pub const ABSTRACT: Self = Self(1 << 6);

    #[inline(always)]
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    #[inline(always)]
    pub const fn with(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }

    #[inline(always)]
    pub const fn without(self, flag: Self) -> Self {
        Self(self.0 & !flag.0)
    }

    /// Needs an access check before it can run
    #[inline(always)]
    pub const fn is_special(self) -> bool {
        self.0 & (Self::PRIVATE.0 | Self::PACKAGE.0 | Self::PROTECTED.0) != 0
    }
}

impl fmt::Debug for MethodFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(MethodFlags, &str); 7] = [
            (MethodFlags::PRIVATE, "private"),
            (MethodFlags::UNGUARDED, "unguarded"),
            (MethodFlags::PROTECTED, "protected"),
            (MethodFlags::PACKAGE, "package"),
            (MethodFlags::ATTRIBUTE, "attribute"),
            (MethodFlags::CONSTANT, "constant"),
            (MethodFlags::ABSTRACT, "abstract"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "MethodFlags[{}]", names.join(" "))
    }
}

#[derive(Clone)]
pub struct Method {
    name: Arc<str>,
    scope: Option<ClassId>,
    package: Option<PackageId>,
    flags: MethodFlags,
    body: Arc<dyn Executable>,
}

impl Method {
    pub fn new(name: impl Into<Arc<str>>, body: Arc<dyn Executable>) -> Self {
        Self {
            name: name.into(),
            scope: None,
            package: None,
            flags: MethodFlags::NONE,
            body,
        }
    }

    /// A method backed by a native function
    pub fn native(name: impl Into<Arc<str>>, function: NativeMethodFn) -> Self {
        Self::new(name, Arc::new(NativeBody(function)))
    }

    /// A method backed by a closure
    pub fn from_fn<F>(name: impl Into<Arc<str>>, function: F) -> Self
    where
        F: Fn(&VM, &Activation, &Value, &[Value]) -> OryxResult<Value> + Send + Sync + 'static,
    {
        Self::new(name, Arc::new(NativeBody(function)))
    }

    /// Getter for the object variable `variable` in the method's scope
    pub fn attribute_getter(name: impl Into<Arc<str>>, variable: impl Into<Arc<str>>) -> Self {
        let method = Self::new(name, Arc::new(AttributeGetter { variable: variable.into() }));
        method.with_flags(MethodFlags::ATTRIBUTE)
    }

    /// Setter (`NAME=`) for the object variable `variable`
    pub fn attribute_setter(name: impl Into<Arc<str>>, variable: impl Into<Arc<str>>) -> Self {
        let method = Self::new(name, Arc::new(AttributeSetter { variable: variable.into() }));
        method.with_flags(MethodFlags::ATTRIBUTE)
    }

    pub fn constant(name: impl Into<Arc<str>>, value: Value) -> Self {
        let method = Self::new(name, Arc::new(ConstantBody { value }));
        method.with_flags(MethodFlags::CONSTANT.with(MethodFlags::UNGUARDED))
    }

    /// A method that must be overridden
    pub fn abstract_method(name: impl Into<Arc<str>>) -> Self {
        let method = Self::new(name, Arc::new(AbstractBody));
        method.with_flags(MethodFlags::ABSTRACT)
    }

    pub fn with_flags(mut self, flags: MethodFlags) -> Self {
        self.flags = self.flags.with(flags);
        self
    }

    pub fn with_package(mut self, package: PackageId) -> Self {
        self.package = Some(package);
        self
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn scope(&self) -> Option<ClassId> {
        self.scope
    }

    pub fn package(&self) -> Option<PackageId> {
        self.package
    }

    pub fn flags(&self) -> MethodFlags {
        self.flags
    }

    pub fn body(&self) -> &Arc<dyn Executable> {
        &self.body
    }

    pub fn set_flag(&mut self, flag: MethodFlags, on: bool) {
        self.flags = if on {
            self.flags.with(flag)
        } else {
            self.flags.without(flag)
        };
    }

    pub fn is_private(&self) -> bool {
        self.flags.contains(MethodFlags::PRIVATE)
    }

    pub fn is_protected(&self) -> bool {
        self.flags.contains(MethodFlags::PROTECTED)
    }

    pub fn is_package_scope(&self) -> bool {
        self.flags.contains(MethodFlags::PACKAGE)
    }

    pub fn is_guarded(&self) -> bool {
        !self.flags.contains(MethodFlags::UNGUARDED)
    }

    pub fn is_special(&self) -> bool {
        self.flags.is_special()
    }

    pub fn is_abstract(&self) -> bool {
        self.flags.contains(MethodFlags::ABSTRACT)
    }

    /// Assign the scope of a method that has none yet
    pub(crate) fn assign_scope(&mut self, scope: ClassId) {
        self.scope = Some(scope);
    }

    /// Copy of this method with a different scope (the original is untouched)
    pub fn new_scope(&self, scope: ClassId) -> Method {
        let mut method = self.clone();
        method.scope = Some(scope);
        method
    }

    pub fn run(
        &self,
        vm: &VM,
        activation: &Activation,
        receiver: &Value,
        message: &str,
        args: &[Value],
    ) -> OryxResult<Value> {
        self.body.run(vm, activation, receiver, message, args)
    }

    pub fn mark_reachable(&self, marker: &mut Marker) {
        self.body.mark_reachable(marker);
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("flags", &self.flags)
            .finish()
    }
}

struct AttributeGetter {
    variable: Arc<str>,
}

impl Executable for AttributeGetter {
    fn run(
        &self,
        vm: &VM,
        activation: &Activation,
        receiver: &Value,
        _message: &str,
        args: &[Value],
    ) -> OryxResult<Value> {
        crate::error::check_arity(0, args.len())?;
        let variables = vm.object_variables(receiver, activation.scope)?;
        Ok(variables
            .get(&self.variable)
            .unwrap_or_else(|| Value::String(self.variable.clone())))
    }
}

struct AttributeSetter {
    variable: Arc<str>,
}

impl Executable for AttributeSetter {
    fn run(
        &self,
        vm: &VM,
        activation: &Activation,
        receiver: &Value,
        _message: &str,
        args: &[Value],
    ) -> OryxResult<Value> {
        crate::error::check_arity(1, args.len())?;
        let variables = vm.object_variables(receiver, activation.scope)?;
        variables.set(&self.variable, args[0].clone());
        Ok(Value::Nil)
    }
}

struct ConstantBody {
    value: Value,
}

impl Executable for ConstantBody {
    fn run(
        &self,
        _vm: &VM,
        _activation: &Activation,
        _receiver: &Value,
        _message: &str,
        _args: &[Value],
    ) -> OryxResult<Value> {
        Ok(self.value.clone())
    }

    fn mark_reachable(&self, marker: &mut Marker) {
        marker.mark_value(&self.value);
    }
}

struct AbstractBody;

impl Executable for AbstractBody {
    fn run(
        &self,
        _vm: &VM,
        _activation: &Activation,
        _receiver: &Value,
        message: &str,
        _args: &[Value],
    ) -> OryxResult<Value> {
        Err(OryxError::new(
            ErrorKind::NoMethod,
            format!("Abstract method \"{}\" cannot be invoked", message),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_operations() {
        let flags = MethodFlags::NONE.with(MethodFlags::PRIVATE).with(MethodFlags::UNGUARDED);
        assert!(flags.contains(MethodFlags::PRIVATE));
        assert!(flags.is_special());
        let flags = flags.without(MethodFlags::PRIVATE);
        assert!(!flags.is_special());
        assert!(MethodFlags::PACKAGE.is_special());
        assert!(MethodFlags::PROTECTED.is_special());
        assert_eq!(format!("{:?}", flags), "MethodFlags[unguarded]");
    }

    #[test]
    fn test_constant_is_unguarded() {
        let method = Method::constant("PI", Value::from("3.14"));
        assert_eq!(method.scope(), None);
        assert!(method.flags().contains(MethodFlags::CONSTANT));
        assert!(!method.is_guarded());
    }

    #[test]
    fn test_set_flag() {
        let mut method = Method::abstract_method("AREA");
        assert!(method.is_abstract());
        assert!(method.is_guarded());
        method.set_flag(MethodFlags::PRIVATE, true);
        assert!(method.is_private());
        method.set_flag(MethodFlags::PRIVATE, false);
        assert!(!method.is_private());
    }
}
