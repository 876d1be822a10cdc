use holdmap::handlers::*;
use holdmap_core::report::ReportFormat;
use holdmap_scanner::{Identity, PartnerQuery};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[test]
fn test_parse_person_arg() {
    let person = parse_person_arg("***123456**:joao da silva");
    assert_eq!(
        person,
        Some(Identity::natural_person("***123456**", "JOAO DA SILVA"))
    );
}

#[test]
fn test_parse_person_arg_invalid() {
    assert_eq!(parse_person_arg("***123456**"), None);
    assert_eq!(parse_person_arg(":JOAO"), None);
    assert_eq!(parse_person_arg("***123456**:"), None);
}

#[test]
fn test_resolve_db_path_directory() {
    let path = resolve_db_path("/tmp/holdmap/");
    assert_eq!(path, PathBuf::from("/tmp/holdmap/holdmap.db"));
}

#[test]
fn test_resolve_db_path_file() {
    let path = resolve_db_path("/tmp/registry.db");
    assert_eq!(path, PathBuf::from("/tmp/registry.db"));
}

#[test]
fn test_resolve_db_path_expands_tilde() {
    let path = resolve_db_path("~/.config/holdmap/");
    assert!(!path.to_string_lossy().starts_with('~'));
    assert!(path.ends_with("holdmap.db"));
}

#[test]
fn test_resolve_output_path_adds_extension() {
    let path = resolve_output_path(Path::new("out/network"), ReportFormat::Gexf);
    assert_eq!(path, PathBuf::from("out/network.gexf"));

    let path = resolve_output_path(Path::new("out/network.xml"), ReportFormat::GraphMl);
    assert_eq!(path, PathBuf::from("out/network.xml"));
}

#[test]
fn test_load_seeds_from_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut temp_file = NamedTempFile::new()?;
    writeln!(temp_file, "# seeds")?;
    writeln!(temp_file, "PJ:11.111.111/0001-11")?;
    writeln!(temp_file)?; // Empty line
    writeln!(temp_file, "PF:***123456**:JOAO DA SILVA")?;
    writeln!(temp_file, "22222222000122")?;
    writeln!(temp_file, "SEARCH:MARIA")?;
    writeln!(temp_file, "garbage")?;

    let seeds = load_seeds_from_file(temp_file.path())?;

    assert_eq!(seeds.len(), 4);
    assert_eq!(seeds[0], Seed::Identity(Identity::legal_entity("11111111000111")));
    assert_eq!(
        seeds[1],
        Seed::Identity(Identity::natural_person("***123456**", "JOAO DA SILVA"))
    );
    assert_eq!(seeds[2], Seed::Identity(Identity::legal_entity("22222222000122")));
    assert_eq!(seeds[3], Seed::Search(PartnerQuery::Name("MARIA".to_string())));

    Ok(())
}

#[test]
fn test_load_seeds_from_file_empty() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file).unwrap();
    writeln!(temp_file, "   ").unwrap();

    let result = load_seeds_from_file(temp_file.path());

    assert!(result.is_err());
    assert!(result.unwrap_err().contains("No valid seeds"));
}

#[test]
fn test_load_seeds_from_file_missing() {
    let result = load_seeds_from_file(Path::new("/nonexistent/seeds.txt"));
    assert!(result.unwrap_err().contains("Failed to read seeds file"));
}

#[test]
fn test_load_seeds_from_source_arguments() {
    let seeds = load_seeds_from_source(
        &["11.111.111/0001-11".to_string()],
        &["***123456**:JOAO DA SILVA".to_string()],
        &["maria".to_string()],
        None,
    )
    .unwrap();

    assert_eq!(seeds.len(), 3);
    assert_eq!(seeds[0], Seed::Identity(Identity::legal_entity("11111111000111")));
    assert_eq!(seeds[2], Seed::Search(PartnerQuery::Name("MARIA".to_string())));
}

#[test]
fn test_load_seeds_from_source_combines_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut temp_file = NamedTempFile::new()?;
    writeln!(temp_file, "22222222000122")?;
    let path = PathBuf::from(temp_file.path());

    let seeds = load_seeds_from_source(&["11111111000111".to_string()], &[], &[], Some(&path))?;

    assert_eq!(seeds.len(), 2);
    assert_eq!(seeds[1], Seed::Identity(Identity::legal_entity("22222222000122")));
    Ok(())
}

#[test]
fn test_load_seeds_from_source_no_input() {
    let result = load_seeds_from_source(&[], &[], &[], None);
    assert!(result.is_err());
    assert!(result.unwrap_err().contains("At least one of"));
}

#[test]
fn test_load_seeds_from_source_invalid_person() {
    let result = load_seeds_from_source(&[], &["JOAO".to_string()], &[], None);
    assert!(result.unwrap_err().contains("expected TAX_ID:NAME"));
}
