use std::collections::BTreeMap;

use color_print::cformat;

use crate::ast::{Node, NodeKind};
use crate::compiler::{EquTable, Entry};
use crate::error::Error;
use crate::label::{is_local, Labels};

/// Converged offset map of one compile.
#[derive(Debug)]
pub struct Binary<'a> {
    pub origin: i64,
    /// Ordered by address
    pub blobs: Vec<Entry<'a>>,
    pub labels: Labels,
    pub equ: EquTable,
    /// Distance from the origin to the end of the last byte
    pub byte_size: usize,
    pub total_passes: usize,
}

impl<'a> Binary<'a> {
    /// Flat image starting at the origin, gaps filled with zeros.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut image = vec![0u8; self.byte_size];
        for (address, blob) in &self.blobs {
            let start = address - self.origin;
            for (i, byte) in blob.bytes().iter().enumerate() {
                let at = start + i as i64;
                if (0..image.len() as i64).contains(&at) {
                    image[at as usize] = *byte;
                }
            }
        }
        image
    }

    pub fn symbols(&self) -> &Labels {
        &self.labels
    }

    pub fn symbols_yaml(&self) -> Result<String, Error> {
        serde_yaml::to_string(&self.labels).map_err(Error::SymbolMap)
    }

    /// Listing of `source` with the address and bytes of every line.
    pub fn dump(&self, nodes: &[Node], source: &str) -> String {
        let mut code: BTreeMap<usize, (i64, Vec<u8>)> = BTreeMap::new();
        for (address, blob) in &self.blobs {
            let (_, bytes) = code
                .entry(blob.node.loc.line)
                .or_insert_with(|| (*address, Vec::new()));
            bytes.extend(blob.bytes());
        }

        let mut marks: BTreeMap<usize, String> = BTreeMap::new();
        let mut parent = String::new();
        for node in nodes {
            let mark = match &node.kind {
                NodeKind::Label(label) => {
                    let name = if is_local(&label.name) {
                        format!("{}{}", parent, label.name)
                    } else {
                        parent = label.name.clone();
                        label.name.clone()
                    };
                    match self.labels.get(&name) {
                        Some(address) => cformat!("<g>{}: @0x{:04X}</>", name, address),
                        None => cformat!("<g>{}:</>", name),
                    }
                }
                NodeKind::Equ(equ) => match self.equ.get(&equ.name).copied().flatten() {
                    Some(value) => cformat!("<y>#0x{:04X} {}</>", value, equ.name),
                    None => cformat!("<y>#???? {}</>", equ.name),
                },
                _ => continue,
            };
            marks.insert(node.loc.line, mark);
        }

        let mut out = String::new();
        for (idx, text) in source.lines().enumerate() {
            let line = idx + 1;
            let mark = marks.get(&line).map(|m| format!(" {m}")).unwrap_or_default();
            let body = match code.get(&line) {
                Some((address, bytes)) => {
                    let mut hex: Vec<String> =
                        bytes.iter().take(6).map(|b| format!("{b:02X}")).collect();
                    if bytes.len() > 6 {
                        hex.push("..".into());
                    }
                    format!(
                        "[{:04X}] {:<20} | {:>4}: {}{}",
                        address,
                        hex.join(" "),
                        line,
                        text,
                        mark
                    )
                }
                None => format!("{:27}| {:>4}: {}{}", "", line, text, mark),
            };
            out.push_str(&body);
            out.push('\n');
        }
        out.push_str(&format!("{}+{}\n", "-".repeat(27), "-".repeat(45)));
        out
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use crate::compiler::compile;
    use crate::error::Error;
    use crate::parser::parse;

    const SOURCE: &str = "[org 0x7C00]\nstart: jmp start\nmsg db 'hi', 0\nlen equ $ - msg";

    #[test]
    fn image_and_symbols() {
        let nodes = parse(SOURCE).unwrap();
        let binary = compile(&nodes).unwrap();
        assert_eq!(binary.to_bytes(), vec![0xEB, 0xFE, b'h', b'i', 0]);
        assert_eq!(binary.byte_size, 5);
        assert_eq!(binary.symbols().get("msg"), Some(0x7C02));
        assert_eq!(binary.equ.get("len"), Some(&Some(3)));
        assert_eq!(binary.symbols_yaml().unwrap(), "start: 31744\nmsg: 31746\n");
    }

    #[test]
    fn dump_lists_every_line() {
        let nodes = parse(SOURCE).unwrap();
        let binary = compile(&nodes).unwrap();
        let dump = binary.dump(&nodes, SOURCE);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("[7C00] EB FE"));
        assert!(lines[2].starts_with("[7C02] 68 69 00"));
        assert!(lines[3].contains("len"));
    }

    #[test]
    fn symbol_map_error() {
        let yaml = serde_yaml::from_str::<i64>("[").unwrap_err();
        let error = Error::SymbolMap(yaml);
        assert_eq!(error.to_string(), "Failed to serialize symbol map");
        assert!(error.source().is_some());
    }
}
