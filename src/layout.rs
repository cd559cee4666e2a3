use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{not_line_ending, space0, space1},
    combinator::{all_consuming, map, map_res, opt},
    multi::many0,
    number::complete::double,
    sequence::{preceded, separated_pair, tuple},
    IResult,
};
use regex::Regex;
use lazy_static::lazy_static;
use std::fs;
use std::path::Path;
use anyhow::{anyhow, Context, Result};
use log::{debug, info};

use crate::circuit::{Circuit, ComponentFault, ComponentType, PlacedComponent, Wire, WireColor};

lazy_static! {
    static ref TERMINAL_PATTERN: Regex = Regex::new(r"^([A-Za-z0-9_]+)\.([A-Za-z0-9_]+)$")
        .expect("terminal pattern is valid");
}

/// Split a `COMPONENT.POINT` reference
pub fn parse_terminal_ref(reference: &str) -> Result<(String, String)> {
    let captures = TERMINAL_PATTERN
        .captures(reference.trim())
        .ok_or_else(|| anyhow!("Invalid terminal reference '{}', expected COMPONENT.POINT", reference))?;
    Ok((captures[1].to_string(), captures[2].to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    On,
    Toggled,
    Fault,
}

#[derive(Debug, Clone, PartialEq)]
struct ComponentLine<'a> {
    id: &'a str,
    component_type: ComponentType,
    position: Option<(f64, f64)>,
    flags: Vec<Flag>,
}

#[derive(Debug, Clone, PartialEq)]
struct WireLine<'a> {
    id: &'a str,
    start: &'a str,
    end: &'a str,
    color: WireColor,
}

#[derive(Debug, Clone, PartialEq)]
enum LayoutLine<'a> {
    Title(&'a str),
    Component(ComponentLine<'a>),
    Wire(WireLine<'a>),
}

/// Loader for circuit snapshots: JSON files, or the line-oriented layout
/// format otherwise
#[derive(Debug, Default)]
pub struct LayoutParser;

impl LayoutParser {
    pub fn new() -> Self {
        LayoutParser
    }

    pub fn parse_file(&self, filename: &str) -> Result<Circuit> {
        let content = fs::read_to_string(filename)
            .with_context(|| format!("Failed to read file '{}'", filename))?;

        let is_json = Path::new(filename)
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let circuit = if is_json {
            self.parse_json(&content)?
        } else {
            self.parse_layout(&content)?
        };

        info!(
            "Loaded '{}' from {}: {} components, {} wires",
            circuit.title,
            filename,
            circuit.components.len(),
            circuit.wires.len()
        );
        Ok(circuit)
    }

    /// Parse a JSON circuit snapshot and check its references
    pub fn parse_json(&self, content: &str) -> Result<Circuit> {
        let circuit: Circuit = serde_json::from_str(content).context("Invalid circuit JSON")?;
        circuit.validate()?;
        Ok(circuit)
    }

    /// Parse the text layout format
    pub fn parse_layout(&self, content: &str) -> Result<Circuit> {
        let mut circuit = Circuit::default();

        for (index, raw) in content.lines().enumerate() {
            let line_num = index + 1;
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            let (_, parsed) = parse_line(line)
                .map_err(|e| anyhow!("Line {}: cannot parse '{}': {}", line_num, line, e))?;
            debug!("Line {}: {:?}", line_num, parsed);

            match parsed {
                LayoutLine::Title(title) => circuit.title = title.trim().to_string(),
                LayoutLine::Component(component) => {
                    let component = build_component(component)
                        .with_context(|| format!("Line {}", line_num))?;
                    circuit
                        .add_component(component)
                        .with_context(|| format!("Line {}", line_num))?;
                }
                LayoutLine::Wire(wire) => {
                    let wire = build_wire(wire).with_context(|| format!("Line {}", line_num))?;
                    circuit
                        .add_wire(wire)
                        .with_context(|| format!("Line {}", line_num))?;
                }
            }
        }

        Ok(circuit)
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn build_component(line: ComponentLine<'_>) -> Result<PlacedComponent> {
    let mut component = PlacedComponent::new(line.id, line.component_type);
    if let Some((x, y)) = line.position {
        component = component.at(x, y);
    }

    for flag in line.flags {
        match flag {
            Flag::On if line.component_type.is_power_source() => component.is_on = Some(true),
            Flag::Toggled if line.component_type.is_switching() => component.is_toggled = Some(true),
            Flag::Fault => component.fault = Some(ComponentFault::OpenCircuit),
            other => {
                return Err(anyhow!(
                    "Flag {:?} does not apply to {} '{}'",
                    other,
                    line.component_type,
                    line.id
                ))
            }
        }
    }

    Ok(component)
}

fn build_wire(line: WireLine<'_>) -> Result<Wire> {
    let (start_component, start_point) = parse_terminal_ref(line.start)?;
    let (end_component, end_point) = parse_terminal_ref(line.end)?;
    Ok(Wire::new(
        line.id,
        (&start_component, &start_point),
        (&end_component, &end_point),
        line.color,
    ))
}

// Parser functions using nom
fn parse_line(input: &str) -> IResult<&str, LayoutLine<'_>> {
    all_consuming(alt((
        map(parse_title, LayoutLine::Title),
        map(parse_component, LayoutLine::Component),
        map(parse_wire, LayoutLine::Wire),
    )))(input)
}

fn parse_title(input: &str) -> IResult<&str, &str> {
    preceded(tuple((tag("title"), space1)), not_line_ending)(input)
}

fn parse_component(input: &str) -> IResult<&str, ComponentLine<'_>> {
    let (input, _) = tag("component")(input)?;
    let (input, _) = space1(input)?;
    let (input, id) = parse_identifier(input)?;
    let (input, _) = space1(input)?;
    let (input, component_type) = map_res(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '-'),
        str::parse::<ComponentType>,
    )(input)?;
    let (input, position) = opt(preceded(
        tuple((space1, tag("at"), space1)),
        separated_pair(double, space1, double),
    ))(input)?;
    let (input, flags) = many0(preceded(space1, parse_flag))(input)?;
    let (input, _) = space0(input)?;

    Ok((
        input,
        ComponentLine {
            id,
            component_type,
            position,
            flags,
        },
    ))
}

fn parse_flag(input: &str) -> IResult<&str, Flag> {
    alt((
        map(tag("on"), |_| Flag::On),
        map(tag("toggled"), |_| Flag::Toggled),
        map(tag("fault"), |_| Flag::Fault),
    ))(input)
}

fn parse_wire(input: &str) -> IResult<&str, WireLine<'_>> {
    let (input, _) = tag("wire")(input)?;
    let (input, _) = space1(input)?;
    let (input, id) = parse_identifier(input)?;
    let (input, _) = space1(input)?;
    let (input, start) = parse_terminal_token(input)?;
    let (input, _) = space1(input)?;
    let (input, end) = parse_terminal_token(input)?;
    let (input, _) = space1(input)?;
    let (input, color) = map_res(take_while1(|c: char| c.is_ascii_alphabetic()), str::parse::<WireColor>)(input)?;
    let (input, _) = space0(input)?;

    Ok((input, WireLine { id, start, end, color }))
}

fn parse_identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn parse_terminal_token(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.')(input)
}
