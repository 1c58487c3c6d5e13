use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use i5validator::ParseEvent;

/// Internal DTD accepting `<root>` with any number of `<item>` children
pub const VALID_DTD_XML: &str = r#"<?xml version="1.0"?>
<!DOCTYPE root [
  <!ELEMENT root (item*)>
  <!ELEMENT item (#PCDATA)>
]>
<root>
  <item>one</item>
  <item>two</item>
</root>
"#;

/// Three undeclared `<bogus/>` elements on lines 7, 8 and 9
pub const REPEATED_VIOLATION_XML: &str = r#"<?xml version="1.0"?>
<!DOCTYPE root [
  <!ELEMENT root (item*)>
  <!ELEMENT item (#PCDATA)>
]>
<root>
  <bogus/>
  <bogus/>
  <bogus/>
</root>
"#;

/// Mismatched end tag
pub const NOT_WELL_FORMED_XML: &str = r#"<?xml version="1.0"?>
<!DOCTYPE root [
  <!ELEMENT root (item*)>
  <!ELEMENT item (#PCDATA)>
]>
<root>
  <item>one</root>
"#;

/// External DTD that does not exist
pub const MISSING_DTD_XML: &str = r#"<?xml version="1.0"?>
<!DOCTYPE root SYSTEM "does-not-exist-anywhere.dtd">
<root/>
"#;

pub const SIMPLE_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="root">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="item" type="xs:string" maxOccurs="unbounded"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>
"#;

pub const XSD_VALID_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
      xsi:noNamespaceSchemaLocation="simple.xsd">
  <item>one</item>
</root>
"#;

pub const XSD_INVALID_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
      xsi:noNamespaceSchemaLocation="simple.xsd">
  <other>one</other>
</root>
"#;

pub fn write_fixture(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

pub fn write_gzip_fixture(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    let mut encoder = flate2::write::GzEncoder::new(
        File::create(&path).unwrap(),
        flate2::Compression::default(),
    );
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap();
    path
}

pub fn event(message: &str, line: u32, column: u32) -> ParseEvent {
    ParseEvent::new(message, Some(line), Some(column))
}

/// External parsed entity that does not exist, referenced from content
pub const UNRESOLVED_ENTITY_XML: &str = r#"<?xml version="1.0"?>
<!DOCTYPE root [
  <!ELEMENT root (#PCDATA)>
  <!ENTITY ext SYSTEM "missing-entity.xml">
]>
<root>&ext;</root>
"#;

/// Schema referring to a type that does not exist
pub const BROKEN_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="root" type="nope"/>
</xs:schema>
"#;

pub const BROKEN_XSD_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
      xsi:noNamespaceSchemaLocation="broken.xsd">text</root>
"#;
