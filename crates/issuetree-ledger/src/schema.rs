pub(crate) const SCHEMA: &str = r#"
-- One row per execution attempt
CREATE TABLE IF NOT EXISTS runs (
  run_id TEXT PRIMARY KEY,
  input_file TEXT NOT NULL,
  input_file_hash TEXT NOT NULL,
  repository TEXT NOT NULL,
  started_at TEXT NOT NULL,
  completed_at TEXT,
  status TEXT NOT NULL CHECK (status IN ('in_progress', 'completed', 'failed'))
);
CREATE INDEX IF NOT EXISTS idx_run_status ON runs(status);
CREATE INDEX IF NOT EXISTS idx_run_input_hash ON runs(input_file_hash);

-- One row per issue that exists in the tracker
CREATE TABLE IF NOT EXISTS created_items (
  run_id TEXT NOT NULL,
  local_id TEXT NOT NULL,
  external_number INTEGER NOT NULL,
  external_url TEXT NOT NULL,
  external_node_id TEXT NOT NULL,
  title TEXT NOT NULL,
  fingerprint TEXT NOT NULL,
  parent_id TEXT,
  parent_external_number INTEGER,
  linked_at TEXT,
  created_at TEXT NOT NULL,
  PRIMARY KEY (run_id, local_id),
  FOREIGN KEY (run_id) REFERENCES runs(run_id)
);
CREATE INDEX IF NOT EXISTS idx_fingerprint ON created_items(fingerprint);
CREATE INDEX IF NOT EXISTS idx_local_id ON created_items(local_id);
"#;
