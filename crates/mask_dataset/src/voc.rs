//! Pascal-VOC annotation parser.
//!
//! Only the fields the pipeline consumes are read: `filename`, `size/width`,
//! `size/height`, and each `object`'s `name` and `bndbox`. Everything else
//! (`pose`, `truncated`, `difficult`, `segmented`, ...) is skipped.

use data_contracts::BoxXyxy;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs;
use std::path::Path;

use crate::types::{DatasetError, DatasetResult};

/// One `<annotation>` document.
#[derive(Debug, Clone, PartialEq)]
pub struct VocAnnotation {
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub objects: Vec<VocObject>,
}

/// One `<object>` entry with its raw (unclipped) box.
#[derive(Debug, Clone, PartialEq)]
pub struct VocObject {
    pub name: String,
    pub bbox: BoxXyxy,
}

#[derive(Default)]
struct PartialObject {
    name: Option<String>,
    xmin: Option<f32>,
    ymin: Option<f32>,
    xmax: Option<f32>,
    ymax: Option<f32>,
}

impl PartialObject {
    fn finish(self, index: usize, path: &Path) -> DatasetResult<VocObject> {
        let missing = |field: &str| DatasetError::Xml {
            path: path.to_path_buf(),
            msg: format!("object[{index}] is missing <{field}>"),
        };
        Ok(VocObject {
            name: self.name.ok_or_else(|| missing("name"))?,
            bbox: BoxXyxy::new(
                self.xmin.ok_or_else(|| missing("bndbox/xmin"))?,
                self.ymin.ok_or_else(|| missing("bndbox/ymin"))?,
                self.xmax.ok_or_else(|| missing("bndbox/xmax"))?,
                self.ymax.ok_or_else(|| missing("bndbox/ymax"))?,
            ),
        })
    }
}

pub fn parse_voc_file(path: &Path) -> DatasetResult<VocAnnotation> {
    let raw = fs::read_to_string(path).map_err(|e| DatasetError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_voc_str(&raw, path)
}

/// Parse a VOC document. `source` is only used in error messages.
pub fn parse_voc_str(xml: &str, source: &Path) -> DatasetResult<VocAnnotation> {
    let xml_err = |msg: String| DatasetError::Xml {
        path: source.to_path_buf(),
        msg,
    };

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    // Element names below the document root, e.g. ["object", "bndbox", "xmin"].
    let mut stack: Vec<String> = Vec::new();
    let mut depth = 0usize;
    let mut filename: Option<String> = None;
    let mut width: Option<u32> = None;
    let mut height: Option<u32> = None;
    let mut objects = Vec::new();
    let mut current: Option<PartialObject> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if depth > 0 {
                    if stack.is_empty() && name == "object" {
                        current = Some(PartialObject::default());
                    }
                    stack.push(name);
                }
                depth += 1;
            }
            Ok(Event::End(_)) => {
                depth = depth.saturating_sub(1);
                if let Some(closed) = stack.pop() {
                    if stack.is_empty() && closed == "object" {
                        if let Some(obj) = current.take() {
                            objects.push(obj.finish(objects.len(), source)?);
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| xml_err(e.to_string()))?
                    .trim()
                    .to_string();
                let path: Vec<&str> = stack.iter().map(String::as_str).collect();
                match path.as_slice() {
                    ["filename"] => filename = Some(text),
                    ["size", "width"] => width = Some(parse_dim(&text, "size/width", source)?),
                    ["size", "height"] => {
                        height = Some(parse_dim(&text, "size/height", source)?)
                    }
                    ["object", "name"] => {
                        if let Some(obj) = current.as_mut() {
                            obj.name = Some(text);
                        }
                    }
                    ["object", "bndbox", coord] => {
                        if let Some(obj) = current.as_mut() {
                            let value = parse_coord(&text, coord, source)?;
                            match *coord {
                                "xmin" => obj.xmin = Some(value),
                                "ymin" => obj.ymin = Some(value),
                                "xmax" => obj.xmax = Some(value),
                                "ymax" => obj.ymax = Some(value),
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(xml_err(format!(
                    "at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
        }
    }

    if depth != 0 {
        return Err(xml_err("unexpected end of document".to_string()));
    }

    Ok(VocAnnotation {
        filename: filename
            .filter(|f| !f.is_empty())
            .ok_or_else(|| xml_err("missing <filename>".to_string()))?,
        width: width.ok_or_else(|| xml_err("missing <size/width>".to_string()))?,
        height: height.ok_or_else(|| xml_err("missing <size/height>".to_string()))?,
        objects,
    })
}

fn parse_dim(text: &str, field: &str, source: &Path) -> DatasetResult<u32> {
    text.parse::<u32>().map_err(|e| DatasetError::Xml {
        path: source.to_path_buf(),
        msg: format!("<{field}> is not a pixel count ({text:?}): {e}"),
    })
}

fn parse_coord(text: &str, field: &str, source: &Path) -> DatasetResult<f32> {
    let value = text.parse::<f32>().map_err(|e| DatasetError::Xml {
        path: source.to_path_buf(),
        msg: format!("<bndbox/{field}> is not a number ({text:?}): {e}"),
    })?;
    if !value.is_finite() {
        return Err(DatasetError::Xml {
            path: source.to_path_buf(),
            msg: format!("<bndbox/{field}> is not finite"),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<annotation>
    <folder>images</folder>
    <filename>maksssksksss0.png</filename>
    <size><width>512</width><height>366</height><depth>3</depth></size>
    <segmented>0</segmented>
    <object>
        <name>without_mask</name>
        <pose>Unspecified</pose>
        <truncated>0</truncated>
        <difficult>0</difficult>
        <bndbox><xmin>79</xmin><ymin>105</ymin><xmax>109</xmax><ymax>142</ymax></bndbox>
    </object>
    <object>
        <name>with_mask</name>
        <bndbox><xmin>185</xmin><ymin>100</ymin><xmax>226.5</xmax><ymax>144</ymax></bndbox>
    </object>
</annotation>"#;

    #[test]
    fn parses_filename_size_and_objects() {
        let ann = parse_voc_str(SAMPLE, Path::new("sample.xml")).unwrap();
        assert_eq!(ann.filename, "maksssksksss0.png");
        assert_eq!((ann.width, ann.height), (512, 366));
        assert_eq!(ann.objects.len(), 2);
        assert_eq!(ann.objects[0].name, "without_mask");
        assert_eq!(ann.objects[0].bbox, BoxXyxy::new(79.0, 105.0, 109.0, 142.0));
        assert_eq!(ann.objects[1].bbox.xmax, 226.5);
    }

    #[test]
    fn missing_bndbox_field_is_an_error() {
        let xml = r#"<annotation><filename>a.png</filename>
            <size><width>10</width><height>10</height></size>
            <object><name>with_mask</name><bndbox><xmin>1</xmin><ymin>1</ymin><xmax>5</xmax></bndbox></object>
        </annotation>"#;
        let err = parse_voc_str(xml, Path::new("broken.xml")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ymax"), "{msg}");
        assert!(msg.contains("broken.xml"), "{msg}");
    }

    #[test]
    fn missing_size_is_an_error() {
        let xml = "<annotation><filename>a.png</filename></annotation>";
        assert!(matches!(
            parse_voc_str(xml, Path::new("nosize.xml")),
            Err(DatasetError::Xml { .. })
        ));
    }

    #[test]
    fn document_without_objects_parses() {
        let xml = r#"<annotation><filename>a.png</filename>
            <size><width>10</width><height>10</height></size></annotation>"#;
        let ann = parse_voc_str(xml, Path::new("empty.xml")).unwrap();
        assert!(ann.objects.is_empty());
    }
}
