mod import;
mod migrate;
mod reconcile;

pub use import::{read_csv, read_csv_file, run_import, CsvRecord, ImportOptions, ImportReport};
pub use migrate::{run_migrate, MigrateOptions, MigrateReport};
pub use reconcile::{select_survivor, ReconcileReport, Reconciler};
