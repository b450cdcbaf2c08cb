// Misc utilities useful to both explog and mbalance.

mod configs;
mod dates;
mod fileglob;

// A structure representing one port of an OpenFlow switch and the host attached to it.

pub use configs::SwitchPort;

// Read a switch port table from a file, or decode one that has already been parsed.

pub use configs::decode_switch_ports;
pub use configs::read_switch_ports;

// Types and utilities for manipulating timestamps.

pub use dates::Timestamp;

// Parse a &str into a Timestamp.

pub use dates::parse_timestamp;

// Whole seconds between two timestamps, wrapping around midnight.

pub use dates::elapsed_seconds;

// Matcher for file name patterns.

pub use fileglob::FileGlobber;

// Test whether a path carries wildcards.

pub use fileglob::is_pattern;

// Expand a path whose last element may be a pattern into a sorted list of file names.

pub use fileglob::expand_file_pattern;
