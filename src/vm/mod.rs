// Oryx object model
// Arenas of classes, methods and objects, the message-send engine and the
// variable storage behind simple, stem and compound variables.

pub mod activity;
pub mod caller;
pub mod class;
pub mod compound;
pub mod dictionary;
pub mod directory;
pub mod dispatch;
pub mod gc;
pub mod interner;
pub mod method;
pub mod object;
pub mod sort;
pub mod stem;
pub mod value;
pub mod variables;
#[allow(clippy::module_inception)]
pub mod vm;

pub use activity::Activity;
pub use caller::{Activation, Executable, NovalueHandler, Outcome, SecurityManager, SignalNovalue};
pub use class::ClassId;
pub use compound::{CompoundElement, CompoundTail};
pub use dictionary::{MethodDictionary, MethodEntry};
pub use directory::{Directory, DirectoryEntry};
pub use gc::{GcStats, Marker, Trace};
pub use method::{Method, MethodFlags, MethodId};
pub use object::ObjectId;
pub use sort::{SortCase, SortOptions, SortOrder};
pub use stem::Stem;
pub use value::Value;
pub use variables::{Variable, VariableDictionary, Watchable};
pub use vm::{BuiltinClasses, PackageId, VM};
