use portscout::ports::{ParseError, PortSpec};

#[test]
fn range_yields_every_port_in_order() {
    let spec = PortSpec::parse("1-100").expect("parse ok");
    assert_eq!(spec.len(), 100);
    assert!(spec
        .ports()
        .windows(2)
        .all(|pair| pair[0] < pair[1]));
    assert_eq!(spec.ports()[0], 1);
    assert_eq!(spec.ports()[99], 100);
}

#[test]
fn single_port_is_a_one_element_spec() {
    let spec = PortSpec::parse("8080").expect("parse ok");
    assert_eq!(spec.ports(), &[8080]);
}

#[test]
fn full_range_parses() {
    let spec = PortSpec::parse("1-65535").expect("parse ok");
    assert_eq!(spec.len(), 65535);
}

#[test]
fn error_taxonomy_is_distinguishable() {
    assert_eq!(PortSpec::parse("0-10"), Err(ParseError::OutOfBounds));
    assert_eq!(PortSpec::parse("100-50"), Err(ParseError::EmptyRange));
    assert_eq!(PortSpec::parse("abc"), Err(ParseError::InvalidFormat));
    assert_eq!(
        PortSpec::parse("70000-70005"),
        Err(ParseError::OutOfBounds)
    );
}
