//! Prepared queries.

use std::marker::PhantomData;

use tablemap_core::Entity;
use tablemap_query::{ParamTable, Parameterized, QueryIntent, RenderedSql};

/// A query rendered once and executed any number of times.
///
/// Variables in the filter stay rebindable: [`set_variable`] and
/// [`prepare`] change the bound values without rendering again.
///
/// ```ignore
/// let mut by_name = engine.compile_query::<Person>(
///     engine
///         .query::<Person>()?
///         .filter_with_parameters(field("name").eq(param_of("name", BindType::Text)))?,
/// )?;
/// by_name.set_variable("name", "ann")?;
/// let ann = engine.run_query(&cx, &by_name).await;
/// by_name.prepare(["bob"])?;
/// let bob = engine.run_query(&cx, &by_name).await;
/// ```
///
/// [`set_variable`]: Parameterized::set_variable
/// [`prepare`]: Parameterized::prepare
#[derive(Debug, Clone)]
pub struct CompiledQuery<E> {
    intent: QueryIntent,
    sql: RenderedSql,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> CompiledQuery<E> {
    pub(crate) fn new(intent: QueryIntent, sql: RenderedSql) -> Self {
        Self {
            intent,
            sql,
            _entity: PhantomData,
        }
    }

    pub fn intent(&self) -> &QueryIntent {
        &self.intent
    }

    /// The statement with `@name` parameter slots.
    pub fn sql(&self) -> &RenderedSql {
        &self.sql
    }
}

impl<E> Parameterized for CompiledQuery<E> {
    fn params(&self) -> &ParamTable {
        &self.intent.params
    }

    fn params_mut(&mut self) -> &mut ParamTable {
        &mut self.intent.params
    }
}
