//! Reading count tables and writing rankings, results and reports

mod csv;
mod results;

pub use self::csv::{
    read_library, read_ranking, write_json, write_labeled_matrix, write_records, write_ranking,
    write_results_table,
};
pub use results::{ResultsSummary, RunReport, WaldResults};
