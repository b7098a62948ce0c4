pub mod decl;
pub mod node;

use std::rc::Rc;

use smallvec::SmallVec;

pub type Args = SmallVec<[Rc<node::Node>; 4]>;
pub type Params = SmallVec<[decl::Param; 4]>;

pub use decl::Program;
