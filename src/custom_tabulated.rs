use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::errors::SGError;
use crate::io::{read_f64_slice, read_i32, read_string, write_f64_slice, write_i32, write_string, TextTokens};

///
/// A one dimensional rule defined by an explicit table: per level node counts,
/// quadrature exactness, nodes and weights. Treated as non-nested by the grid
/// engines; nested tables still work, they just forgo the shared-node storage.
///
/// The text form mirrors the historical format:
///
/// ```text
/// description: <free text>
/// levels: <n>
/// <num_points_0> <q_exact_0> ... <num_points_{n-1}> <q_exact_{n-1}>
/// <weight> <node> pairs, level by level
/// ```
///
#[derive(Clone, Default, Debug, Serialize, Deserialize, PartialEq)]
pub struct CustomTabulated
{
    description: String,
    num_points: Vec<i32>,
    precision: Vec<i64>,
    nodes: Vec<Vec<f64>>,
    weights: Vec<Vec<f64>>,
}

impl CustomTabulated
{
    pub fn from_parts(description: &str, num_points: Vec<i32>, precision: Vec<i64>,
        nodes: Vec<Vec<f64>>, weights: Vec<Vec<f64>>) -> Self
    {
        Self { description: description.to_owned(), num_points, precision, nodes, weights }
    }

    pub fn description(&self) -> &str
    {
        &self.description
    }

    pub fn num_levels(&self) -> usize
    {
        self.num_points.len()
    }

    /// Guard used by grid construction: the table must cover `max_level`.
    pub fn check_level(&self, max_level: u32) -> Result<(), SGError>
    {
        if (max_level as usize) < self.num_levels() { Ok(()) } else { Err(SGError::CustomRuleTooShort) }
    }

    pub fn num_points(&self, level: u32) -> usize
    {
        self.num_points[level as usize] as usize
    }

    pub fn q_exact(&self, level: u32) -> i64
    {
        self.precision[level as usize]
    }

    pub fn i_exact(&self, level: u32) -> i64
    {
        self.num_points[level as usize] as i64 - 1
    }

    pub fn nodes(&self, level: u32) -> &[f64]
    {
        &self.nodes[level as usize]
    }

    pub fn weights(&self, level: u32) -> &[f64]
    {
        &self.weights[level as usize]
    }

    pub fn write_text<W: Write>(&self, writer: &mut W) -> Result<(), SGError>
    {
        let mut out = format!("description: {}\nlevels: {}\n", self.description, self.num_levels());
        for (n, p) in self.num_points.iter().zip(&self.precision)
        {
            out.push_str(&format!("{} {} ", n, p));
        }
        out.push('\n');
        for (nodes, weights) in self.nodes.iter().zip(&self.weights)
        {
            for (x, w) in nodes.iter().zip(weights)
            {
                out.push_str(&format!("{} {} ", crate::io::format_f64(*w), crate::io::format_f64(*x)));
            }
            out.push('\n');
        }
        writer.write_all(out.as_bytes()).map_err(|_| SGError::WriteBufferFailed)
    }

    pub fn read_text(tokens: &mut TextTokens) -> Result<Self, SGError>
    {
        let tag = tokens.token()?;
        if tag != "description:"
        {
            return Err(SGError::DeserializationFailed);
        }
        let description = tokens.line()?.to_owned();
        let tag = tokens.token()?;
        if tag != "levels:"
        {
            return Err(SGError::DeserializationFailed);
        }
        let num_levels: usize = tokens.usize()?;
        let mut num_points = Vec::with_capacity(num_levels);
        let mut precision = Vec::with_capacity(num_levels);
        for _ in 0..num_levels
        {
            num_points.push(tokens.i32()?);
            precision.push(tokens.i64()?);
        }
        let mut nodes = Vec::with_capacity(num_levels);
        let mut weights = Vec::with_capacity(num_levels);
        for &n in &num_points
        {
            let mut level_nodes = Vec::with_capacity(n as usize);
            let mut level_weights = Vec::with_capacity(n as usize);
            for _ in 0..n
            {
                level_weights.push(tokens.f64()?);
                level_nodes.push(tokens.f64()?);
            }
            nodes.push(level_nodes);
            weights.push(level_weights);
        }
        Ok(Self { description, num_points, precision, nodes, weights })
    }

    pub fn write_binary<W: Write>(&self, writer: &mut W) -> Result<(), SGError>
    {
        write_string(writer, &self.description)?;
        write_i32(writer, self.num_levels() as i32)?;
        for (&n, &p) in self.num_points.iter().zip(&self.precision)
        {
            write_i32(writer, n)?;
            write_i32(writer, p as i32)?;
        }
        for (nodes, weights) in self.nodes.iter().zip(&self.weights)
        {
            write_f64_slice(writer, weights)?;
            write_f64_slice(writer, nodes)?;
        }
        Ok(())
    }

    pub fn read_binary<R: Read>(reader: &mut R) -> Result<Self, SGError>
    {
        let description = read_string(reader)?;
        let num_levels = read_i32(reader)? as usize;
        let mut num_points = Vec::with_capacity(num_levels);
        let mut precision = Vec::with_capacity(num_levels);
        for _ in 0..num_levels
        {
            num_points.push(read_i32(reader)?);
            precision.push(read_i32(reader)? as i64);
        }
        let mut nodes = Vec::with_capacity(num_levels);
        let mut weights = Vec::with_capacity(num_levels);
        for &n in &num_points
        {
            weights.push(read_f64_slice(reader, n as usize)?);
            nodes.push(read_f64_slice(reader, n as usize)?);
        }
        Ok(Self { description, num_points, precision, nodes, weights })
    }

    /// Read a rule description from a file on disk.
    pub fn from_file(path: &str) -> Result<Self, SGError>
    {
        let data = std::fs::read_to_string(path).map_err(|_| SGError::FileIOError)?;
        let mut tokens = TextTokens::from_string(data);
        Self::read_text(&mut tokens)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn midpoint_family() -> CustomTabulated
    {
        // composite midpoint rules: level l has 2l + 1 equal-weight nodes
        let mut num_points = Vec::new();
        let mut precision = Vec::new();
        let mut nodes = Vec::new();
        let mut weights = Vec::new();
        for level in 0..4i32
        {
            let n = 2 * level + 1;
            num_points.push(n);
            precision.push(1);
            let h = 2.0 / n as f64;
            nodes.push((0..n).map(|i| -1.0 + h * (i as f64 + 0.5)).collect());
            weights.push(vec![h; n as usize]);
        }
        CustomTabulated::from_parts("composite midpoint", num_points, precision, nodes, weights)
    }

    #[test]
    fn text_round_trip()
    {
        let rule = midpoint_family();
        let mut buffer = Vec::new();
        rule.write_text(&mut buffer).unwrap();
        let mut tokens = TextTokens::from_string(String::from_utf8(buffer).unwrap());
        let back = CustomTabulated::read_text(&mut tokens).unwrap();
        assert_eq!(rule, back);
        assert_eq!(back.description(), "composite midpoint");
        assert_eq!(back.num_points(2), 5);
        assert_eq!(back.i_exact(2), 4);
    }

    #[test]
    fn binary_round_trip()
    {
        let rule = midpoint_family();
        let mut buffer = Vec::new();
        rule.write_binary(&mut buffer).unwrap();
        let back = CustomTabulated::read_binary(&mut buffer.as_slice()).unwrap();
        assert_eq!(rule, back);
    }

    #[test]
    fn short_table_is_detected()
    {
        let rule = midpoint_family();
        assert!(rule.check_level(3).is_ok());
        assert_eq!(rule.check_level(4), Err(SGError::CustomRuleTooShort));
    }
}
