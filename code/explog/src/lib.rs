/// An experiment log records the requests made by a load generator against a set of key-value
/// servers sitting behind an SDN switch that balances the load.  Each request is logged with its
/// time, key, latency, the server it was sent to and the server that answered, and the number of
/// response packets received; see record.rs for the format.  Log files are found alone or as a
/// numbered set matched by a pattern; see loader.rs.
///
/// The purpose of this library is to answer questions about how the load was spread:
///
/// - Read and parse the log, recovering the server roster from its metadata.
///
/// - Bucket the requests by server, by the server the client targeted or the server that
///   answered, and find the server that serves a particular key.
///
/// - Compute distributions of latency and packet loss and per-server summaries.
///
/// - Find the hottest keys, which are the candidates for moving between servers.
mod distribution;
mod errors;
mod hotkeys;
mod loader;
mod partition;
mod record;
mod stats;

// Errors from this library, and a Result type carrying them.

pub use errors::LogError;
pub use errors::Result;

// A parsed data line and its packet counts.

pub use record::PacketCounts;
pub use record::Request;

// The latency of a request that got no response.

pub use record::LATENCY_LOST;

// The server index meaning "unknown" or "lost".

pub use record::LOST_SERVER_INDEX;

// Read a log file, or a set of log files named by a pattern.

pub use loader::load;
pub use loader::read_logfile;
pub use loader::LogData;
pub use loader::METADATA_MARKER;

// Bucket requests by server according to a policy, and find the server for a key.

pub use partition::checked_index;
pub use partition::partition;
pub use partition::resolve_server_index;
pub use partition::server_index_for_key;
pub use partition::ServerBuckets;
pub use partition::ServerPolicy;
pub use partition::LOSS_FALLBACK_THRESHOLD;

// Cumulative distributions: bucketed for latency, by value for packet loss.

pub use distribution::histogram;
pub use distribution::int_cdf;
pub use distribution::latency_cdf;
pub use distribution::latency_cdf_per_server;
pub use distribution::packet_loss_cdf;
pub use distribution::packet_loss_cdf_per_server;
pub use distribution::packet_loss_per_request;
pub use distribution::CdfPoint;

// Per-server summaries.

pub use stats::average_latency;
pub use stats::experiment_duration;
pub use stats::mbit_per_second;
pub use stats::packet_totals;
pub use stats::request_counts;
pub use stats::request_shares;
pub use stats::requests_per_second;
pub use stats::successful_request_counts;
pub use stats::PacketTotals;

// Key counts in first-seen order, and the most requested keys.

pub use hotkeys::key_occurrences;
pub use hotkeys::top_keys;
