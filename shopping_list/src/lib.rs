use std::fmt;
use std::fmt::Write as _;
use std::io::Write as _;

use flate2::{write::ZlibEncoder, Compression};

mod font;

use font::EmbeddedFont;

/// One aggregated row of the shopping list: every cart recipe's amount of
/// the same (name, unit) pair summed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientTotal {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

impl fmt::Display for IngredientTotal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({}) - {}", self.name, self.measurement_unit, self.amount)
    }
}

#[derive(Debug)]
pub enum PdfError {
    Font(ttf_parser::FaceParsingError),
    Compression(std::io::Error),
}

impl fmt::Display for PdfError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PdfError::Font(e) => write!(f, "cannot load embedded font: {}", e),
            PdfError::Compression(e) => write!(f, "cannot compress font stream: {}", e),
        }
    }
}

impl std::error::Error for PdfError {}

#[derive(Debug, Clone, Default)]
pub struct ShoppingList {
    pub totals: Vec<IngredientTotal>,
}

// A4 in points.
const PAGE_WIDTH: i32 = 595;
const PAGE_HEIGHT: i32 = 842;
const START_X: i32 = 100;
const START_Y: i32 = 700;
const LINE_STEP: i32 = 12;
const BOTTOM_MARGIN: i32 = 50;
const FONT_SIZE: i32 = 12;

// Fixed objects; pages follow as (page, content) pairs.
const CATALOG: usize = 1;
const PAGES: usize = 2;
const TYPE0_FONT: usize = 3;
const CID_FONT: usize = 4;
const DESCRIPTOR: usize = 5;
const FONT_FILE: usize = 6;
const TO_UNICODE: usize = 7;
const FIRST_PAGE: usize = 8;

impl ShoppingList {
    pub fn new(totals: Vec<IngredientTotal>) -> Self {
        ShoppingList { totals }
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    pub fn lines(&self) -> Vec<String> {
        self.totals.iter().map(|t| t.to_string()).collect()
    }

    pub fn lines_per_page() -> usize {
        ((START_Y - BOTTOM_MARGIN) / LINE_STEP + 1) as usize
    }

    /// Splits the lines into pages. An empty list still has one blank page.
    fn pages(&self) -> Vec<Vec<String>> {
        let lines = self.lines();
        if lines.is_empty() {
            return vec![Vec::new()];
        }
        lines
            .chunks(Self::lines_per_page())
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    /// Renders the list as a PDF 1.4 document with DejaVu Serif embedded,
    /// so names in any script the font covers come out as written. Each
    /// line is drawn at `START_X`, stepping down from `START_Y`.
    pub fn to_pdf(&self) -> Result<Vec<u8>, PdfError> {
        let mut font = EmbeddedFont::dejavu_serif().map_err(PdfError::Font)?;
        let contents: Vec<Vec<u8>> = self
            .pages()
            .iter()
            .map(|page| page_content(page, &mut font))
            .collect();

        let page_ids: Vec<usize> = (0..contents.len()).map(|i| FIRST_PAGE + i * 2).collect();
        let kids = page_ids
            .iter()
            .map(|id| format!("{} 0 R", id))
            .collect::<Vec<_>>()
            .join(" ");

        let mut writer = PdfWriter::default();
        writer.object(
            CATALOG,
            format!("<< /Type /Catalog /Pages {} 0 R >>", PAGES).as_bytes(),
        );
        writer.object(
            PAGES,
            format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, contents.len()).as_bytes(),
        );
        writer.object(
            TYPE0_FONT,
            format!(
                "<< /Type /Font /Subtype /Type0 /BaseFont /{} /Encoding /Identity-H \
                 /DescendantFonts [{} 0 R] /ToUnicode {} 0 R >>",
                font::FONT_NAME,
                CID_FONT,
                TO_UNICODE
            )
            .as_bytes(),
        );
        writer.object(CID_FONT, font.cid_font(DESCRIPTOR).as_bytes());
        writer.object(DESCRIPTOR, font.descriptor(FONT_FILE).as_bytes());

        let compressed = deflate(font.data).map_err(PdfError::Compression)?;
        writer.stream(
            FONT_FILE,
            &format!("/Length1 {} /Filter /FlateDecode", font.data.len()),
            &compressed,
        );
        writer.stream(TO_UNICODE, "", font.to_unicode().as_bytes());

        for (content, id) in contents.iter().zip(page_ids) {
            writer.object(
                id,
                format!(
                    "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] \
                     /Resources << /Font << /F1 {} 0 R >> >> /Contents {} 0 R >>",
                    PAGES,
                    PAGE_WIDTH,
                    PAGE_HEIGHT,
                    TYPE0_FONT,
                    id + 1
                )
                .as_bytes(),
            );
            writer.stream(id + 1, "", content);
        }

        Ok(writer.finish(CATALOG))
    }
}

fn page_content(lines: &[String], font: &mut EmbeddedFont) -> Vec<u8> {
    let mut content = String::new();
    let mut y = START_Y;
    for line in lines {
        let _ = writeln!(
            content,
            "BT /F1 {} Tf {} {} Td <{}> Tj ET",
            FONT_SIZE,
            START_X,
            y,
            font.encode(line)
        );
        y -= LINE_STEP;
    }
    content.into_bytes()
}

fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[derive(Default)]
struct PdfWriter {
    buffer: Vec<u8>,
    offsets: Vec<(usize, usize)>,
}

impl PdfWriter {
    fn object(&mut self, id: usize, body: &[u8]) {
        if self.buffer.is_empty() {
            self.buffer.extend_from_slice(b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n");
        }
        self.offsets.push((id, self.buffer.len()));
        self.buffer
            .extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
        self.buffer.extend_from_slice(body);
        self.buffer.extend_from_slice(b"\nendobj\n");
    }

    fn stream(&mut self, id: usize, extra: &str, data: &[u8]) {
        let mut body = if extra.is_empty() {
            format!("<< /Length {} >>\nstream\n", data.len())
        } else {
            format!("<< /Length {} {} >>\nstream\n", data.len(), extra)
        }
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.object(id, &body);
    }

    fn finish(mut self, root: usize) -> Vec<u8> {
        self.offsets.sort_by_key(|(id, _)| *id);
        let size = self.offsets.len() + 1;
        let xref_at = self.buffer.len();

        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", size);
        for (_, offset) in &self.offsets {
            let _ = write!(xref, "{:010} 00000 n \n", offset);
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {} /Root {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            size, root, xref_at
        );
        self.buffer.extend_from_slice(xref.as_bytes());
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Read;

    use super::*;

    fn total(name: &str, unit: &str, amount: i64) -> IngredientTotal {
        IngredientTotal {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            amount,
        }
    }

    fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
        haystack[from..]
            .windows(needle.len())
            .position(|w| w == needle)
            .map(|p| p + from)
    }

    /// Every stream in the document as (dictionary, body).
    fn streams(pdf: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut found = Vec::new();
        let mut at = 0;
        while let Some(start) = find(pdf, b" 0 obj\n<< /Length ", at) {
            let dict_start = start + " 0 obj\n".len();
            let dict_end = find(pdf, b">>\nstream\n", dict_start).unwrap();
            let dict = String::from_utf8(pdf[dict_start..dict_end].to_vec()).unwrap();
            let length: usize = dict["<< /Length ".len()..]
                .split_whitespace()
                .next()
                .unwrap()
                .parse()
                .unwrap();
            let body_start = dict_end + ">>\nstream\n".len();
            found.push((dict, pdf[body_start..body_start + length].to_vec()));
            at = body_start + length;
        }
        found
    }

    fn to_unicode_map(pdf: &[u8]) -> HashMap<u16, String> {
        let (_, cmap) = streams(pdf)
            .into_iter()
            .find(|(_, body)| find(body, b"begincmap", 0).is_some())
            .unwrap();
        let cmap = String::from_utf8(cmap).unwrap();
        cmap.lines()
            .filter_map(|line| {
                let (gid, unicode) = line.split_once("> <")?;
                let gid = u16::from_str_radix(gid.strip_prefix('<')?, 16).ok()?;
                let units: Vec<u16> = unicode
                    .trim_end_matches('>')
                    .as_bytes()
                    .chunks(4)
                    .map(|c| u16::from_str_radix(std::str::from_utf8(c).unwrap(), 16).unwrap())
                    .collect();
                Some((gid, String::from_utf16(&units).unwrap()))
            })
            .collect()
    }

    fn page_contents(pdf: &[u8]) -> Vec<String> {
        streams(pdf)
            .into_iter()
            .filter(|(dict, body)| {
                !dict.contains("/Length1") && find(body, b"begincmap", 0).is_none()
            })
            .map(|(_, body)| String::from_utf8(body).unwrap())
            .collect()
    }

    /// The text a viewer extracts from each drawn line, with its position.
    fn drawn_lines(pdf: &[u8]) -> Vec<(String, String)> {
        let map = to_unicode_map(pdf);
        page_contents(pdf)
            .iter()
            .flat_map(|content| content.lines().map(str::to_string).collect::<Vec<_>>())
            .map(|op| {
                let position = op
                    .split(" Tf ")
                    .nth(1)
                    .and_then(|rest| rest.split(" Td").next())
                    .unwrap()
                    .to_string();
                let hex = &op[op.find('<').unwrap() + 1..op.find('>').unwrap()];
                let text = hex
                    .as_bytes()
                    .chunks(4)
                    .map(|c| {
                        let gid = u16::from_str_radix(std::str::from_utf8(c).unwrap(), 16).unwrap();
                        map.get(&gid).cloned().unwrap_or_else(|| "\u{FFFD}".to_string())
                    })
                    .collect();
                (position, text)
            })
            .collect()
    }

    #[test]
    fn formats_lines_as_name_unit_amount() {
        let list = ShoppingList::new(vec![total("flour", "g", 300), total("milk", "ml", 250)]);
        assert_eq!(list.lines(), vec!["flour(g) - 300", "milk(ml) - 250"]);
    }

    #[test]
    fn cyrillic_names_survive_into_the_document() {
        let pdf = ShoppingList::new(vec![
            total("мука", "г", 300),
            total("молоко", "мл", 250),
        ])
        .to_pdf()
        .unwrap();
        assert_eq!(
            drawn_lines(&pdf),
            vec![
                ("100 700".to_string(), "мука(г) - 300".to_string()),
                ("100 688".to_string(), "молоко(мл) - 250".to_string()),
            ]
        );
    }

    #[test]
    fn pdf_has_header_trailer_and_unicode_font() {
        let pdf = ShoppingList::new(vec![total("flour", "g", 300)]).to_pdf().unwrap();
        assert!(pdf.starts_with(b"%PDF-1.4"));
        assert!(pdf.ends_with(b"%%EOF\n"));
        let head = String::from_utf8_lossy(&pdf[..find(&pdf, b"stream\n", 0).unwrap()]).into_owned();
        assert!(head.contains("/Count 1"));
        assert!(head.contains("/Subtype /Type0 /BaseFont /DejaVuSerif /Encoding /Identity-H"));
        assert!(head.contains("/CIDToGIDMap /Identity"));
    }

    #[test]
    fn font_program_is_embedded_whole() {
        let pdf = ShoppingList::new(vec![total("flour", "g", 300)]).to_pdf().unwrap();
        let (dict, body) = streams(&pdf)
            .into_iter()
            .find(|(dict, _)| dict.contains("/Length1"))
            .unwrap();
        assert!(dict.contains("/Filter /FlateDecode"));
        let mut program = Vec::new();
        flate2::read::ZlibDecoder::new(&body[..])
            .read_to_end(&mut program)
            .unwrap();
        assert_eq!(program, font::DEJAVU_SERIF);
    }

    #[test]
    fn lines_step_down_the_page() {
        let pdf = ShoppingList::new(vec![
            total("eggs", "pcs", 3),
            total("flour", "g", 300),
            total("salt", "pinch", 1),
        ])
        .to_pdf()
        .unwrap();
        let positions: Vec<String> = drawn_lines(&pdf).into_iter().map(|(p, _)| p).collect();
        assert_eq!(positions, vec!["100 700", "100 688", "100 676"]);
    }

    #[test]
    fn empty_list_renders_one_blank_page() {
        let list = ShoppingList::default();
        assert!(list.is_empty());
        let pdf = list.to_pdf().unwrap();
        assert_eq!(page_contents(&pdf), vec![String::new()]);
    }

    #[test]
    fn long_lists_continue_on_new_pages() {
        let per_page = ShoppingList::lines_per_page();
        let totals = (0..per_page + 1)
            .map(|i| total(&format!("item{:03}", i), "g", i as i64 + 1))
            .collect();
        let pdf = ShoppingList::new(totals).to_pdf().unwrap();
        let contents = page_contents(&pdf);
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].lines().count(), per_page);
        assert!(contents[1].starts_with("BT /F1 12 Tf 100 700 Td <"));

        let lines = drawn_lines(&pdf);
        assert_eq!(lines.last().unwrap().1, format!("item{:03}(g) - {}", per_page, per_page + 1));
    }

    #[test]
    fn xref_points_at_objects() {
        let pdf = ShoppingList::new(vec![total("flour", "g", 300)]).to_pdf().unwrap();
        let tail_at = find(&pdf, b"startxref\n", pdf.len() - 64).unwrap() + "startxref\n".len();
        let offset: usize = String::from_utf8_lossy(&pdf[tail_at..])
            .lines()
            .next()
            .and_then(|l| l.trim().parse().ok())
            .unwrap();
        assert!(pdf[offset..].starts_with(b"xref"));

        let table = String::from_utf8_lossy(&pdf[offset..]).into_owned();
        let entries: Vec<usize> = table
            .lines()
            .filter(|l| l.ends_with(" n "))
            .map(|l| l[..10].parse().unwrap())
            .collect();
        for (i, at) in entries.iter().enumerate() {
            assert!(pdf[*at..].starts_with(format!("{} 0 obj", i + 1).as_bytes()));
        }
    }
}
