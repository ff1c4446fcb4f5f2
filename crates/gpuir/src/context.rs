//! `CompilationContext` — the type interner and value arena, held as one
//! explicit value and threaded by reference into every builder. There is
//! no process-global interner; see `DESIGN.md` for why.

use crate::ir::value::ValueArena;
use crate::types::TypeContext;

/// Everything a compilation shares across the methods it builds
/// concurrently: the type interner and the value arena. Both tolerate
/// concurrent reads and internally synchronize writes, so a single
/// `CompilationContext` can be handed to several method builders running
/// on different threads at once, each compiling a distinct method
/// concurrently.
#[derive(Default)]
pub struct CompilationContext {
    pub types: TypeContext,
    pub values: ValueArena,
}

impl CompilationContext {
    pub fn new() -> Self {
        Self {
            types: TypeContext::new(),
            values: ValueArena::new(),
        }
    }
}
