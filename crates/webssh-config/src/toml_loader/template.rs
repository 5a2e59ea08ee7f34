//! Commented default config, written on first run.

pub(crate) const DEFAULT_CONFIG_TOML: &str = r##"# webssh gateway configuration
# Schema version 1
# Point WEBSSH_CONFIG at another file to use it instead of this one.
# Only override what you want to change -- missing fields use defaults.

[server]
# bind = "0.0.0.0"
# port = 8080
# ws_path = "/ws"             # must start with '/'
# shutdown_grace_secs = 5     # 0-300

[ssh]
# connect_timeout_secs = 10   # 1-120
# default_port = 22           # used when a connect request sends port 0
# keepalive_interval_secs = 30  # 0 disables, 0-3600

[terminal]
# term = "xterm-256color"
# rows = 40                   # 1-1000, used when the client sends no size
# cols = 120                  # 1-1000
# echo = true
# baud = 14400

[bridge]
# outbound_queue = 256        # 1-65536
# read_buffer_size = 8192     # 512-1048576
# drain_timeout_ms = 2000     # 0-60000

[logging]
# level = "info"              # trace, debug, info, warn, error
# ansi = true
"##;
