use std::collections::BTreeMap;
use std::fmt::Write as _;

use ttf_parser::{Face, FaceParsingError};

pub(crate) const FONT_NAME: &str = "DejaVuSerif";
pub(crate) static DEJAVU_SERIF: &[u8] = include_bytes!("../fonts/DejaVuSerif.ttf");

// bfchar blocks are limited to 100 entries.
const BFCHAR_BLOCK: usize = 100;

/// A TrueType font embedded as an Identity-H CID font. Text is written as
/// glyph ids, and every glyph used is remembered for the width table and
/// the ToUnicode map.
pub(crate) struct EmbeddedFont<'a> {
    face: Face<'a>,
    pub data: &'a [u8],
    used: BTreeMap<u16, char>,
}

impl EmbeddedFont<'static> {
    pub fn dejavu_serif() -> Result<Self, FaceParsingError> {
        Ok(EmbeddedFont {
            face: Face::parse(DEJAVU_SERIF, 0)?,
            data: DEJAVU_SERIF,
            used: BTreeMap::new(),
        })
    }
}

impl<'a> EmbeddedFont<'a> {
    /// Hex glyph ids for a `<...> Tj` operand. Characters the font lacks
    /// fall back to `.notdef`.
    pub fn encode(&mut self, text: &str) -> String {
        let mut hex = String::with_capacity(text.len() * 4);
        for c in text.chars() {
            let gid = self.face.glyph_index(c).map(|g| g.0).unwrap_or(0);
            if gid != 0 {
                self.used.entry(gid).or_insert(c);
            }
            let _ = write!(hex, "{:04X}", gid);
        }
        hex
    }

    /// Font units to PDF glyph space (1000 per em).
    fn scale(&self, value: i32) -> i32 {
        value * 1000 / i32::from(self.face.units_per_em().max(1))
    }

    fn advance(&self, gid: u16) -> i32 {
        let advance = self
            .face
            .glyph_hor_advance(ttf_parser::GlyphId(gid))
            .unwrap_or(0);
        self.scale(i32::from(advance))
    }

    pub fn cid_font(&self, descriptor: usize) -> String {
        let mut widths = String::new();
        for gid in self.used.keys() {
            let _ = write!(widths, "{} [{}] ", gid, self.advance(*gid));
        }
        format!(
            "<< /Type /Font /Subtype /CIDFontType2 /BaseFont /{} \
             /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> \
             /FontDescriptor {} 0 R /CIDToGIDMap /Identity /DW {} /W [{}] >>",
            FONT_NAME,
            descriptor,
            self.advance(0),
            widths.trim_end()
        )
    }

    pub fn descriptor(&self, font_file: usize) -> String {
        let bbox = self.face.global_bounding_box();
        let ascent = self.scale(i32::from(self.face.ascender()));
        format!(
            "<< /Type /FontDescriptor /FontName /{} /Flags 32 /FontBBox [{} {} {} {}] \
             /ItalicAngle 0 /Ascent {} /Descent {} /CapHeight {} /StemV 80 /FontFile2 {} 0 R >>",
            FONT_NAME,
            self.scale(i32::from(bbox.x_min)),
            self.scale(i32::from(bbox.y_min)),
            self.scale(i32::from(bbox.x_max)),
            self.scale(i32::from(bbox.y_max)),
            ascent,
            self.scale(i32::from(self.face.descender())),
            self.face
                .capital_height()
                .map(|h| self.scale(i32::from(h)))
                .unwrap_or(ascent),
            font_file
        )
    }

    /// CMap that lets viewers copy and search the text as Unicode.
    pub fn to_unicode(&self) -> String {
        let mut cmap = String::from(
            "/CIDInit /ProcSet findresource begin\n\
             12 dict begin\n\
             begincmap\n\
             /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
             /CMapName /Adobe-Identity-UCS def\n\
             /CMapType 2 def\n\
             1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
        );
        let entries: Vec<(&u16, &char)> = self.used.iter().collect();
        for block in entries.chunks(BFCHAR_BLOCK) {
            let _ = writeln!(cmap, "{} beginbfchar", block.len());
            for (gid, c) in block {
                let mut units = [0u16; 2];
                let unicode: String = c
                    .encode_utf16(&mut units)
                    .iter()
                    .map(|u| format!("{:04X}", u))
                    .collect();
                let _ = writeln!(cmap, "<{:04X}> <{}>", gid, unicode);
            }
            cmap.push_str("endbfchar\n");
        }
        cmap.push_str(
            "endcmap\n\
             CMapName currentdict /defineresource pop\n\
             end\n\
             end",
        );
        cmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_font_covers_latin_and_cyrillic() {
        let mut font = EmbeddedFont::dejavu_serif().unwrap();
        let hex = font.encode("Aм");
        assert_eq!(hex.len(), 8);
        assert!(!hex.starts_with("0000"));
        assert!(!hex.ends_with("0000"));
    }

    #[test]
    fn missing_glyphs_use_notdef_and_stay_out_of_the_map() {
        let mut font = EmbeddedFont::dejavu_serif().unwrap();
        // Private use area, not in DejaVu.
        assert_eq!(font.encode("\u{F8FF}"), "0000");
        assert!(!font.to_unicode().contains("beginbfchar"));
    }

    #[test]
    fn to_unicode_maps_used_glyphs_back() {
        let mut font = EmbeddedFont::dejavu_serif().unwrap();
        let hex = font.encode("г");
        let cmap = font.to_unicode();
        assert!(cmap.contains("1 beginbfchar"));
        assert!(cmap.contains(&format!("<{}> <0433>", hex)));
    }

    #[test]
    fn widths_cover_used_glyphs() {
        let mut font = EmbeddedFont::dejavu_serif().unwrap();
        let hex = font.encode("м");
        let gid = u16::from_str_radix(&hex, 16).unwrap();
        assert!(font.cid_font(5).contains(&format!("/W [{} [", gid)));
    }
}
