use super::*;
use std::fs;
use tempfile::tempdir;

#[derive(Debug, Deserialize, PartialEq)]
struct DbConfig {
    host: String,
    #[serde(default)]
    port: u16,
}

#[derive(Debug, Deserialize, PartialEq)]
struct AppConfig {
    name: String,
    db: DbConfig,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
struct CacheConfig {
    #[serde(default)]
    ttl_sec: u64,
}

#[test]
fn load_reads_file_and_decodes_sections() {
    let tmp = tempdir().expect("Failed to create temp dir");
    let path = tmp.path().join("config.yml");
    fs::write(
        &path,
        r#"
name: "orders"
db:
  host: "db.internal"
  port: 5432
"#,
    )
    .unwrap();

    let doc = ConfigDocument::load(&path, None).expect("Failed to load config");

    assert_eq!(doc.path(), path.as_path());
    let db: DbConfig = doc.extract("db").unwrap();
    assert_eq!(
        db,
        DbConfig {
            host: "db.internal".into(),
            port: 5432
        }
    );
}

#[test]
fn booter_key_decodes_whole_document() {
    let doc = ConfigDocument::from_yaml_str(
        "name: svc\ndb: {host: h, port: 1}\n",
        "inline.yml",
        None,
    )
    .unwrap();

    let app: AppConfig = doc.extract(BOOTER_KEY).unwrap();
    assert_eq!(app.name, "svc");
    assert_eq!(app.db.port, 1);
    assert!(doc.contains(BOOTER_KEY));
}

#[test]
fn env_tokens_expand_and_unset_ones_blank_out() {
    std::env::set_var("BOOTKIT_CFG_TEST_DB_HOST", "localhost");
    let doc = ConfigDocument::from_yaml_str(
        r#"
db: {host: "${BOOTKIT_CFG_TEST_DB_HOST}"}
replica: {host: "${BOOTKIT_CFG_TEST_NEVER_SET}"}
"#,
        "inline.yml",
        None,
    )
    .unwrap();

    let db: DbConfig = doc.extract("db").unwrap();
    assert_eq!(db.host, "localhost");

    let replica: DbConfig = doc.extract("replica").unwrap();
    assert_eq!(replica.host, "");
}

#[test]
fn prefixed_env_overrides_yaml() {
    std::env::set_var("BKTEST_OVR__DB__HOST", "from-env");
    let doc = ConfigDocument::from_yaml_str(
        "db: {host: from-yaml, port: 5432}\n",
        "inline.yml",
        Some("BKTEST_OVR__"),
    )
    .unwrap();

    let db: DbConfig = doc.extract("db").unwrap();
    assert_eq!(db.host, "from-env");
    assert_eq!(db.port, 5432);
}

#[test]
fn expanded_token_feeds_a_numeric_field() {
    std::env::set_var("BOOTKIT_CFG_TEST_DB_PORT", "6543");
    let doc = ConfigDocument::from_yaml_str(
        "db: {host: h, port: \"${BOOTKIT_CFG_TEST_DB_PORT}\"}\n",
        "inline.yml",
        None,
    )
    .unwrap();

    let db: DbConfig = doc.extract("db").unwrap();
    assert_eq!(db.port, 6543);
}

#[derive(Debug, Deserialize)]
struct FlagConfig {
    enabled: bool,
    limit: Option<u64>,
}

#[test]
fn quoted_scalars_decode_into_typed_fields() {
    let doc = ConfigDocument::from_yaml_str(
        "flags: {enabled: \"true\", limit: \"10\"}\n",
        "inline.yml",
        None,
    )
    .unwrap();

    let flags: FlagConfig = doc.extract("flags").unwrap();
    assert!(flags.enabled);
    assert_eq!(flags.limit, Some(10));
}

#[test]
fn numeric_env_override_keeps_string_fields_intact() {
    std::env::set_var("BKTEST_NUM__DB__HOST", "12345");
    std::env::set_var("BKTEST_NUM__DB__PORT", "7000");
    let doc = ConfigDocument::from_yaml_str(
        "db: {host: from-yaml, port: 5432}\n",
        "inline.yml",
        Some("BKTEST_NUM__"),
    )
    .unwrap();

    let db: DbConfig = doc.extract("db").unwrap();
    assert_eq!(db.host, "12345");
    assert_eq!(db.port, 7000);
}

#[test]
fn env_override_alone_creates_a_section() {
    std::env::set_var("BKTEST_NEW__CACHE__TTL_SEC", "30");
    let doc =
        ConfigDocument::from_yaml_str("", "empty.yml", Some("BKTEST_NEW__")).unwrap();

    assert!(doc.contains("cache"));
    let cache: CacheConfig = doc.extract("cache").unwrap();
    assert_eq!(cache.ttl_sec, 30);
}

#[test]
fn missing_file_is_not_found() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("absent.yml");

    match ConfigDocument::load(&path, None) {
        Err(ConfigError::NotFound { path: p }) => assert_eq!(p, path),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn malformed_yaml_is_a_parse_error() {
    let err = ConfigDocument::from_yaml_str("db: [unclosed", "bad.yml", None).unwrap_err();
    match err {
        ConfigError::Parse { path, .. } => assert_eq!(path, PathBuf::from("bad.yml")),
        other => panic!("expected Parse, got {other:?}"),
    }
}

#[test]
fn empty_document_decodes_defaultable_sections() {
    let doc = ConfigDocument::from_yaml_str("", "empty.yml", None).unwrap();

    let cache: CacheConfig = doc.extract("cache").unwrap();
    assert_eq!(cache, CacheConfig::default());
    assert!(!doc.contains("cache"));
}

#[test]
fn absent_section_without_defaults_names_the_key() {
    let doc = ConfigDocument::from_yaml_str("other: 1\n", "inline.yml", None).unwrap();

    let err = doc.extract::<DbConfig>("db").unwrap_err();
    assert!(matches!(&err, ConfigError::MissingSection { key, .. } if key == "db"));
    assert!(err.to_string().contains("'db'"));
}

#[test]
fn wrong_shape_is_a_decode_error_with_key() {
    let doc = ConfigDocument::from_yaml_str("db: {host: h, port: not-a-port}\n", "x.yml", None)
        .unwrap();

    let err = doc.extract::<DbConfig>("db").unwrap_err();
    assert!(matches!(&err, ConfigError::Decode { key, .. } if key == "db"));
}

#[test]
fn nested_keys_use_dots() {
    let doc =
        ConfigDocument::from_yaml_str("services:\n  db: {host: nested}\n", "x.yml", None).unwrap();

    let db: DbConfig = doc.extract("services.db").unwrap();
    assert_eq!(db.host, "nested");
}

#[test]
fn logging_section_defaults_to_console_info() {
    let doc = ConfigDocument::from_yaml_str("name: x\n", "x.yml", None).unwrap();

    let logging = doc.logging().unwrap();
    let default = logging.get("default").unwrap();
    assert_eq!(default.console_level, "info");
    assert!(default.file.is_empty());
}

#[test]
fn logging_section_is_parsed() {
    let doc = ConfigDocument::from_yaml_str(
        r#"
logging:
  default:
    console_level: warn
    file: "logs/app.log"
    file_level: debug
    max_backups: 3
  bootkit:
    console_level: debug
"#,
        "x.yml",
        None,
    )
    .unwrap();

    let logging = doc.logging().unwrap();
    assert_eq!(logging["default"].console_level, "warn");
    assert_eq!(logging["default"].file, "logs/app.log");
    assert_eq!(logging["default"].max_backups, Some(3));
    assert_eq!(logging["bootkit"].console_level, "debug");
    assert!(logging["bootkit"].file.is_empty());
}

#[test]
fn debug_level_override() {
    let test_cases = vec![("info", "debug"), ("warn", "debug"), ("trace", "trace")];

    for (configured, expected) in test_cases {
        let mut logging = default_logging_config();
        logging.get_mut("default").unwrap().console_level = configured.to_string();

        apply_debug_level(&mut logging);

        assert_eq!(
            logging["default"].console_level, expected,
            "configured level {configured}"
        );
    }

    let mut empty = LoggingConfig::new();
    apply_debug_level(&mut empty);
    assert_eq!(empty["default"].console_level, "debug");
}
