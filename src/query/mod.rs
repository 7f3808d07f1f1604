pub mod coerce;
pub mod finder;
pub mod operator;
pub mod order;
pub mod scope;

pub use finder::{Criteria, FinderOptions, OPTION_KEYS, QueryOptions, compile};
pub use operator::{Clause, Operator};
pub use order::{Direction, NATURAL, OrderDirective, Sort};
pub use scope::{Pagination, QueryScope, ScopeFn, ScopeRegistry};
