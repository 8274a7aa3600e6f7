pub mod mutation_watcher;
