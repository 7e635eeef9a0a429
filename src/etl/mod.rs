/// ETL Stages Module
///
/// The three stages the pipeline sequences for every subreddit:
/// - Extract: pull posts and comments from the source
/// - Transform: clean posts and derive features
/// - Load: store rows and roll up daily statistics
pub mod extract;
pub mod load;
pub mod transform;
