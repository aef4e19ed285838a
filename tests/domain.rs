use assert_matches::assert_matches;

use eurostat_fs::domain::{Agency, ItemKey, KeyConfig};
use eurostat_fs::error::CatalogError;

#[test]
fn key_without_connection() {
    let key = KeyConfig::new(Agency::Estat, None).item_key("NAMA_10_GDP");
    assert_eq!(key.to_string(), "sdmx:ESTAT:NAMA_10_GDP");
    assert_eq!("sdmx:ESTAT:NAMA_10_GDP".parse::<ItemKey>().unwrap(), key);
}

#[test]
fn connection_may_contain_colons() {
    let key: ItemKey = "sdmx:EMPL:LMP_EXPSUMM:eu:prod".parse().unwrap();
    assert_eq!(key.agency(), Agency::Empl);
    assert_eq!(key.dataflow_id(), "LMP_EXPSUMM");
    assert_eq!(key.connection(), Some("eu:prod"));
    assert_eq!(key.to_string(), "sdmx:EMPL:LMP_EXPSUMM:eu:prod");
}

#[test]
fn malformed_keys() {
    for raw in ["", "NAMA_10_GDP", "sdmx:ESTAT", "sdmx:ESTAT:", "sdmx:IMF:GDP", "file:ESTAT:GDP"] {
        let err = raw.parse::<ItemKey>().unwrap_err();
        assert_matches!(err, CatalogError::InvalidItemKey(_), "key {raw:?}");
    }
}

#[test]
fn unknown_agency() {
    let err = "IMF".parse::<Agency>().unwrap_err();
    assert_matches!(err, CatalogError::UnknownAgency(_));
}

#[test]
fn agency_serde_uses_codes() {
    let json = serde_json::to_string(&Agency::Comp).unwrap();
    assert_eq!(json, "\"COMP\"");
    let agency: Agency = serde_json::from_str("\"EMPL\"").unwrap();
    assert_eq!(agency, Agency::Empl);
}
