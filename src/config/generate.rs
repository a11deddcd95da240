pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# GKLE CONFIGURATION
# =============================================================================
# gkle watches the directory gatekeeper rotates its logs into, sums the
# per-lcore "Basic measurements" counters of every reporting interval and
# writes one point per interval to InfluxDB.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/gkle/config.yml
#   3. /etc/gkle.yaml
#
# Values may reference environment variables as $env{NAME}.

# Directory holding gatekeeper_YYYY_MM_DD_HH_MM.log files.
gk_log_dir: /var/log/gatekeeper

# Where the path of the last fully exported log file is kept.
checkpoint_path: /var/lib/gkle/last

# What to do when the checkpointed file is no longer in gk_log_dir:
#   resume_after   process the files rotated after it (default)
#   reprocess_all  process every retained file again
#   halt           export nothing until the checkpoint is fixed by hand
on_missing_watermark: resume_after

# Export the backlog right away instead of waiting for the next rotation.
drain_on_startup: true

# Optional override of the measurement line grammar. Capture groups are
# positional: lcore id, timestamp (YYYY-MM-DD HH:MM:SS), then the 14 counters
# in the order gatekeeper prints them.
# log_line_regex: '^GK/(\d+)\s+(\S+\s+\S+)\s+NOTICE ...'

influxdb:
  url: http://localhost:8086
  user: gkle
  password: $env{GKLE_INFLUX_PASSWORD}
  database: gatekeeper
  retention_policy: autogen
  # Value of the host tag; defaults to this machine's hostname.
  # hostname: gatekeeper-01
  measurement: gkle
  timeout: 10s
  # log_level from older releases is still accepted but has no effect;
  # use RUST_LOG (e.g. RUST_LOG=gkle=debug) instead.
"#
    .to_string()
}
