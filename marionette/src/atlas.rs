use crate::Error;
use std::str::FromStr;

/// A parsed texture atlas: pages of packed regions.
///
/// The parser only produces data; creating textures from page names is the
/// renderer's concern.
#[derive(Clone, Debug)]
pub struct Atlas {
    pub pages: Vec<AtlasPage>,
    pub regions: Vec<AtlasRegion>,
}

impl Atlas {
    pub fn parse(input: &str) -> Result<Self, Error> {
        parse_atlas(input)
    }

    pub fn find_region(&self, name: &str) -> Option<&AtlasRegion> {
        self.regions.iter().find(|r| r.name == name)
    }
}

impl FromStr for Atlas {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_atlas(s)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum AtlasFormat {
    Alpha,
    Intensity,
    LuminanceAlpha,
    Rgb565,
    Rgba4444,
    Rgb888,
    #[default]
    Rgba8888,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum AtlasFilter {
    #[default]
    Nearest,
    Linear,
    MipMap,
    MipMapNearestNearest,
    MipMapLinearNearest,
    MipMapNearestLinear,
    MipMapLinearLinear,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum AtlasWrap {
    #[default]
    ClampToEdge,
    Repeat,
}

#[derive(Clone, Debug)]
pub struct AtlasPage {
    pub name: String,
    pub format: AtlasFormat,
    pub min_filter: AtlasFilter,
    pub mag_filter: AtlasFilter,
    pub wrap_u: AtlasWrap,
    pub wrap_v: AtlasWrap,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug)]
pub struct AtlasRegion {
    pub name: String,
    pub page: usize,
    pub rotate: bool,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub u: f32,
    pub v: f32,
    pub u2: f32,
    pub v2: f32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub original_width: i32,
    pub original_height: i32,
    pub index: i32,
    pub splits: Vec<i32>,
    pub pads: Vec<i32>,
}

fn parse_atlas(input: &str) -> Result<Atlas, Error> {
    let mut pages: Vec<AtlasPage> = Vec::new();
    let mut regions: Vec<AtlasRegion> = Vec::new();

    let mut current_page: Option<usize> = None;
    let mut current_region: Option<AtlasRegion> = None;
    let mut expect_new_page = true;

    fn finalize_region(pages: &[AtlasPage], mut region: AtlasRegion) -> AtlasRegion {
        if region.original_width == 0 {
            region.original_width = region.width;
        }
        if region.original_height == 0 {
            region.original_height = region.height;
        }
        if let Some(page) = pages.get(region.page) {
            if page.width > 0 && page.height > 0 {
                let (pw, ph) = (page.width as f32, page.height as f32);
                region.u = region.x as f32 / pw;
                region.v = region.y as f32 / ph;
                if region.rotate {
                    region.u2 = (region.x + region.height) as f32 / pw;
                    region.v2 = (region.y + region.width) as f32 / ph;
                } else {
                    region.u2 = (region.x + region.width) as f32 / pw;
                    region.v2 = (region.y + region.height) as f32 / ph;
                }
            }
        }
        region
    }

    for raw_line in input.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            if let Some(region) = current_region.take() {
                regions.push(finalize_region(&pages, region));
            }
            if current_page.is_some() {
                expect_new_page = true;
            }
            continue;
        }

        if current_page.is_none() || expect_new_page {
            pages.push(AtlasPage {
                name: line.to_string(),
                format: AtlasFormat::default(),
                min_filter: AtlasFilter::default(),
                mag_filter: AtlasFilter::default(),
                wrap_u: AtlasWrap::default(),
                wrap_v: AtlasWrap::default(),
                width: 0,
                height: 0,
            });
            current_page = Some(pages.len() - 1);
            current_region = None;
            expect_new_page = false;
            continue;
        }

        let page_index = current_page.expect("page exists past the first line");

        let Some((key, value)) = line.split_once(':') else {
            // A line without a colon starts a new region entry.
            if let Some(region) = current_region.take() {
                regions.push(finalize_region(&pages, region));
            }
            current_region = Some(AtlasRegion {
                name: line.to_string(),
                page: page_index,
                rotate: false,
                x: 0,
                y: 0,
                width: 0,
                height: 0,
                u: 0.0,
                v: 0.0,
                u2: 0.0,
                v2: 0.0,
                offset_x: 0,
                offset_y: 0,
                original_width: 0,
                original_height: 0,
                index: -1,
                splits: Vec::new(),
                pads: Vec::new(),
            });
            continue;
        };

        let key = key.trim();
        let value = value.trim();

        if let Some(region) = current_region.as_mut() {
            match key {
                "rotate" => region.rotate = value == "true",
                "xy" => {
                    let (x, y) = parse_pair(value)?;
                    region.x = x;
                    region.y = y;
                }
                "size" => {
                    let (w, h) = parse_pair(value)?;
                    region.width = w;
                    region.height = h;
                }
                "split" => region.splits = parse_tuple(value, 4)?,
                "pad" => region.pads = parse_tuple(value, 4)?,
                "orig" => {
                    let (w, h) = parse_pair(value)?;
                    region.original_width = w;
                    region.original_height = h;
                }
                "offset" => {
                    let (x, y) = parse_pair(value)?;
                    region.offset_x = x;
                    region.offset_y = y;
                }
                "index" => {
                    region.index = value.parse().map_err(|_| Error::AtlasParse {
                        message: format!("invalid region index: {value}"),
                    })?;
                }
                _ => {}
            }
        } else {
            let page = &mut pages[page_index];
            match key {
                "size" => {
                    let (w, h) = parse_pair(value)?;
                    page.width = w.max(0) as u32;
                    page.height = h.max(0) as u32;
                }
                "format" => page.format = parse_format(value)?,
                "filter" => {
                    let (min, mag) = value.split_once(',').ok_or_else(|| Error::AtlasParse {
                        message: format!("invalid page filter: {value}"),
                    })?;
                    page.min_filter = parse_filter(min.trim())?;
                    page.mag_filter = parse_filter(mag.trim())?;
                }
                "repeat" => {
                    let (wrap_u, wrap_v) = parse_repeat(value);
                    page.wrap_u = wrap_u;
                    page.wrap_v = wrap_v;
                }
                _ => {}
            }
        }
    }

    if let Some(region) = current_region.take() {
        regions.push(finalize_region(&pages, region));
    }

    if pages.is_empty() {
        return Err(Error::AtlasParse {
            message: "empty atlas".to_string(),
        });
    }

    Ok(Atlas { pages, regions })
}

fn parse_pair(value: &str) -> Result<(i32, i32), Error> {
    let invalid = || Error::AtlasParse {
        message: format!("expected 'x, y' pair: {value}"),
    };
    let (a, b) = value.split_once(',').ok_or_else(invalid)?;
    let a = a.trim().parse().map_err(|_| invalid())?;
    let b = b.trim().parse().map_err(|_| invalid())?;
    Ok((a, b))
}

fn parse_tuple(value: &str, count: usize) -> Result<Vec<i32>, Error> {
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| Error::AtlasParse {
            message: format!("expected {count} integers: {value}"),
        })?;
    if parts.len() != count {
        return Err(Error::AtlasParse {
            message: format!("expected {count} integers: {value}"),
        });
    }
    Ok(parts)
}

fn parse_format(value: &str) -> Result<AtlasFormat, Error> {
    match value {
        "Alpha" => Ok(AtlasFormat::Alpha),
        "Intensity" => Ok(AtlasFormat::Intensity),
        "LuminanceAlpha" => Ok(AtlasFormat::LuminanceAlpha),
        "RGB565" => Ok(AtlasFormat::Rgb565),
        "RGBA4444" => Ok(AtlasFormat::Rgba4444),
        "RGB888" => Ok(AtlasFormat::Rgb888),
        "RGBA8888" => Ok(AtlasFormat::Rgba8888),
        other => Err(Error::AtlasParse {
            message: format!("unknown page format: {other}"),
        }),
    }
}

fn parse_filter(value: &str) -> Result<AtlasFilter, Error> {
    match value {
        "Nearest" => Ok(AtlasFilter::Nearest),
        "Linear" => Ok(AtlasFilter::Linear),
        "MipMap" => Ok(AtlasFilter::MipMap),
        "MipMapNearestNearest" => Ok(AtlasFilter::MipMapNearestNearest),
        "MipMapLinearNearest" => Ok(AtlasFilter::MipMapLinearNearest),
        "MipMapNearestLinear" => Ok(AtlasFilter::MipMapNearestLinear),
        "MipMapLinearLinear" => Ok(AtlasFilter::MipMapLinearLinear),
        other => Err(Error::AtlasParse {
            message: format!("unknown page filter: {other}"),
        }),
    }
}

fn parse_repeat(value: &str) -> (AtlasWrap, AtlasWrap) {
    match value {
        "x" => (AtlasWrap::Repeat, AtlasWrap::ClampToEdge),
        "y" => (AtlasWrap::ClampToEdge, AtlasWrap::Repeat),
        "xy" => (AtlasWrap::Repeat, AtlasWrap::Repeat),
        _ => (AtlasWrap::ClampToEdge, AtlasWrap::ClampToEdge),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
page.png
size: 64,32
format: RGBA8888
filter: Linear, Linear
repeat: none
head
  rotate: false
  xy: 0, 0
  size: 16, 8
  orig: 16, 8
  offset: 0, 0
  index: -1
arm
  rotate: true
  xy: 16, 8
  size: 8, 4
  orig: 10, 6
  offset: 1, 1
  index: 2
"#;

    #[test]
    fn parse_pages_and_regions() {
        let atlas = Atlas::parse(SAMPLE).unwrap();
        assert_eq!(atlas.pages.len(), 1);
        let page = &atlas.pages[0];
        assert_eq!(page.name, "page.png");
        assert_eq!(page.width, 64);
        assert_eq!(page.height, 32);
        assert_eq!(page.format, AtlasFormat::Rgba8888);
        assert_eq!(page.min_filter, AtlasFilter::Linear);
        assert_eq!(page.wrap_u, AtlasWrap::ClampToEdge);

        assert_eq!(atlas.regions.len(), 2);
        let head = atlas.find_region("head").unwrap();
        assert_eq!(head.page, 0);
        assert!(!head.rotate);
        assert_eq!((head.width, head.height), (16, 8));
        assert_eq!(head.index, -1);

        let arm = atlas.find_region("arm").unwrap();
        assert!(arm.rotate);
        assert_eq!((arm.offset_x, arm.offset_y), (1, 1));
        assert_eq!((arm.original_width, arm.original_height), (10, 6));
        assert_eq!(arm.index, 2);
    }

    #[test]
    fn region_uvs_derive_from_page_size() {
        let atlas = Atlas::parse(SAMPLE).unwrap();
        let head = atlas.find_region("head").unwrap();
        assert_eq!(head.u, 0.0);
        assert_eq!(head.v, 0.0);
        assert_eq!(head.u2, 16.0 / 64.0);
        assert_eq!(head.v2, 8.0 / 32.0);

        // Rotated regions swap width/height when computing the far corner.
        let arm = atlas.find_region("arm").unwrap();
        assert_eq!(arm.u2, (16.0 + 4.0) / 64.0);
        assert_eq!(arm.v2, (8.0 + 8.0) / 32.0);
    }

    #[test]
    fn split_and_pad_entries() {
        let atlas = Atlas::parse(
            r#"
page.png
size: 32,32
button
  rotate: false
  xy: 0, 0
  size: 8, 8
  split: 1, 2, 3, 4
  pad: 5, 6, 7, 8
  orig: 8, 8
  offset: 0, 0
  index: -1
"#,
        )
        .unwrap();
        let button = atlas.find_region("button").unwrap();
        assert_eq!(button.splits, vec![1, 2, 3, 4]);
        assert_eq!(button.pads, vec![5, 6, 7, 8]);
    }

    #[test]
    fn missing_region_and_bad_format_are_errors() {
        let atlas = Atlas::parse(SAMPLE).unwrap();
        assert!(atlas.find_region("leg").is_none());

        let err = Atlas::parse("page.png\nformat: BGRA\n").unwrap_err();
        assert!(matches!(err, Error::AtlasParse { .. }));

        assert!(Atlas::parse("   \n\n").is_err());
    }

    #[test]
    fn multiple_pages_after_blank_line() {
        let atlas = Atlas::parse(
            r#"
a.png
size: 16,16
r0
  xy: 0, 0
  size: 4, 4

b.png
size: 16,16
r1
  xy: 4, 4
  size: 4, 4
"#,
        )
        .unwrap();
        assert_eq!(atlas.pages.len(), 2);
        assert_eq!(atlas.find_region("r0").unwrap().page, 0);
        assert_eq!(atlas.find_region("r1").unwrap().page, 1);
    }
}
