use rustc_hash::FxHashSet;

use crate::multi_index_set::MultiIndexSet;

///
/// Enumerate the largest downward-closed set whose members all satisfy
/// `criterion`. Expansion is level-by-level from the origin; a candidate is
/// admitted only when every immediate parent is already present, which keeps
/// the result lower even for non-monotone criteria.
///
pub fn lower_set_from_criterion<F: Fn(&[i32]) -> bool>(num_dimensions: usize, criterion: F) -> MultiIndexSet
{
    let origin = vec![0i32; num_dimensions];
    let mut set = MultiIndexSet::new(num_dimensions);
    if !criterion(&origin)
    {
        return set;
    }
    set.insert(&origin);
    let mut frontier = vec![origin];
    while !frontier.is_empty()
    {
        let mut next: Vec<Vec<i32>> = Vec::new();
        let mut seen = FxHashSet::default();
        for t in &frontier
        {
            for j in 0..num_dimensions
            {
                let mut child = t.clone();
                child[j] += 1;
                if set.contains(&child) || !seen.insert(child.clone())
                {
                    continue;
                }
                let mut parents_present = true;
                for i in 0..num_dimensions
                {
                    if child[i] > 0
                    {
                        child[i] -= 1;
                        parents_present &= set.contains(&child);
                        child[i] += 1;
                    }
                }
                if parents_present && criterion(&child)
                {
                    next.push(child);
                }
            }
        }
        for t in &next
        {
            set.insert(t);
        }
        frontier = next;
    }
    set
}

///
/// Smolyak combinatorial coefficients: for each tensor `t`,
/// `w(t) = sum over s in {0,1}^d of (-1)^|s| [t + s in set]`.
///
pub fn tensor_weights(tensors: &MultiIndexSet) -> Vec<i32>
{
    let d = tensors.num_dimensions();
    let mut weights = vec![0i32; tensors.len()];
    let mut shifted = vec![0i32; d];
    for (i, t) in tensors.iter().enumerate()
    {
        let mut w = 0i32;
        for s in 0u32..(1 << d)
        {
            for j in 0..d
            {
                shifted[j] = t[j] + ((s >> j) & 1) as i32;
            }
            if tensors.contains(&shifted)
            {
                w += 1 - 2 * (s.count_ones() as i32 % 2);
            }
        }
        weights[i] = w;
    }
    weights
}

/// Order-preserving subsequence of tensors with non-zero Smolyak weight,
/// paired with those weights.
pub fn active_tensors(tensors: &MultiIndexSet, weights: &[i32]) -> (MultiIndexSet, Vec<i32>)
{
    let d = tensors.num_dimensions();
    let mut flat = Vec::new();
    let mut active_w = Vec::new();
    for (t, &w) in tensors.iter().zip(weights)
    {
        if w != 0
        {
            flat.extend_from_slice(t);
            active_w.push(w);
        }
    }
    (MultiIndexSet::from_indexes(d, flat), active_w)
}

/// Drop every index with `t[j] > limits[j]` in a dimension where `limits[j] >= 0`.
pub fn remove_by_limit(set: &MultiIndexSet, limits: &[i32]) -> MultiIndexSet
{
    let mut flat = Vec::new();
    for t in set.iter()
    {
        let ok = t.iter().zip(limits).all(|(&v, &lim)| lim < 0 || v <= lim);
        if ok
        {
            flat.extend_from_slice(t);
        }
    }
    MultiIndexSet::from_indexes(set.num_dimensions(), flat)
}

/// Complete `set` to the smallest downward-closed superset.
pub fn complete_to_lower(set: &MultiIndexSet) -> MultiIndexSet
{
    let d = set.num_dimensions();
    let mut result = set.clone();
    let mut pending: Vec<Vec<i32>> = set.iter().map(|t| t.to_vec()).collect();
    while let Some(t) = pending.pop()
    {
        for j in 0..d
        {
            if t[j] > 0
            {
                let mut parent = t.clone();
                parent[j] -= 1;
                if result.missing(&parent)
                {
                    result.insert(&parent);
                    pending.push(parent);
                }
            }
        }
    }
    result
}

///
/// Points of a nested-rule grid: the union over all tensors of the product
/// sets `[0, n(t_j))`, de-duplicated by index equality.
///
pub fn generate_nested_points<F: Fn(i32) -> usize>(tensors: &MultiIndexSet, num_points: F) -> MultiIndexSet
{
    let d = tensors.num_dimensions();
    let mut seen: FxHashSet<Vec<i32>> = FxHashSet::default();
    let mut flat = Vec::new();
    let mut bounds = vec![0usize; d];
    for t in tensors.iter()
    {
        for (b, &level) in bounds.iter_mut().zip(t)
        {
            *b = num_points(level);
        }
        let total: usize = bounds.iter().product();
        for i in 0..total
        {
            let mut rem = i;
            let mut p = vec![0i32; d];
            for j in (0..d).rev()
            {
                p[j] = (rem % bounds[j]) as i32;
                rem /= bounds[j];
            }
            if seen.insert(p.clone())
            {
                flat.extend_from_slice(&p);
            }
        }
    }
    MultiIndexSet::from_indexes(d, flat)
}

///
/// Points of a non-nested-rule grid, generated over the active tensors only.
/// Each point index is the cumulative (level-offset) index supplied by
/// `offset_index`, so logically duplicated nodes from different levels remain
/// distinct entries.
///
pub fn generate_non_nested_points<F: Fn(i32, usize) -> i32, N: Fn(i32) -> usize>(
    active: &MultiIndexSet, offset_index: F, num_points: N) -> MultiIndexSet
{
    let d = active.num_dimensions();
    let mut seen: FxHashSet<Vec<i32>> = FxHashSet::default();
    let mut flat = Vec::new();
    let mut bounds = vec![0usize; d];
    for t in active.iter()
    {
        for (b, &level) in bounds.iter_mut().zip(t)
        {
            *b = num_points(level);
        }
        let total: usize = bounds.iter().product();
        for i in 0..total
        {
            let mut rem = i;
            let mut p = vec![0i32; d];
            for j in (0..d).rev()
            {
                p[j] = offset_index(t[j], rem % bounds[j]);
                rem /= bounds[j];
            }
            if seen.insert(p.clone())
            {
                flat.extend_from_slice(&p);
            }
        }
    }
    MultiIndexSet::from_indexes(d, flat)
}

///
/// Immediate successors (`p + e_j`) of every flagged point that are not
/// already in `points`, honoring non-negative level limits.
///
pub fn select_flagged_children(points: &MultiIndexSet, flagged: &[bool], limits: &[i32]) -> MultiIndexSet
{
    let d = points.num_dimensions();
    let mut kids = MultiIndexSet::new(d);
    for (p, &is_flagged) in points.iter().zip(flagged)
    {
        if !is_flagged
        {
            continue;
        }
        let mut kid = p.to_vec();
        for j in 0..d
        {
            kid[j] += 1;
            let allowed = limits.is_empty() || limits[j] < 0 || kid[j] <= limits[j];
            if allowed && points.missing(&kid)
            {
                kids.insert(&kid);
            }
            kid[j] -= 1;
        }
    }
    kids
}

///
/// Children (`t + e_j`) of `tensors` that are not in `tensors` or `exclude`,
/// have all their parents inside `tensors`, and respect the level limits.
/// Used to propose candidate tensors during dynamic construction.
///
pub fn add_exclusive_children(tensors: &MultiIndexSet, exclude: &MultiIndexSet, limits: &[i32]) -> MultiIndexSet
{
    let d = tensors.num_dimensions();
    let mut kids = MultiIndexSet::new(d);
    for t in tensors.iter()
    {
        let mut kid = t.to_vec();
        for j in 0..d
        {
            kid[j] += 1;
            let allowed = limits.is_empty() || limits[j] < 0 || kid[j] <= limits[j];
            if allowed && tensors.missing(&kid) && exclude.missing(&kid)
            {
                let mut parents_present = true;
                for i in 0..d
                {
                    if kid[i] > 0
                    {
                        kid[i] -= 1;
                        parents_present &= tensors.contains(&kid);
                        kid[i] += 1;
                    }
                }
                if parents_present
                {
                    kids.insert(&kid);
                }
            }
            kid[j] -= 1;
        }
    }
    kids
}

///
/// Polynomial space of a grid: union over the active tensors of the product
/// ranges `[0, exactness(t_j)]`.
///
pub fn polynomial_space<F: Fn(i32) -> i64>(active: &MultiIndexSet, exactness: F) -> MultiIndexSet
{
    generate_nested_points(active, |level| exactness(level) as usize + 1)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn lower_set_total_degree()
    {
        let set = lower_set_from_criterion(2, |t| t.iter().sum::<i32>() <= 2);
        assert_eq!(set.len(), 6);
        for t in set.iter()
        {
            for j in 0..2
            {
                if t[j] > 0
                {
                    let mut parent = t.to_vec();
                    parent[j] -= 1;
                    assert!(set.contains(&parent));
                }
            }
        }
    }

    #[test]
    fn inclusion_exclusion_weights()
    {
        // classic 2d total-degree depth 2: corner tensors weigh +1,
        // the inner diagonal -1, the origin +... let the identity speak:
        let set = lower_set_from_criterion(2, |t| t.iter().sum::<i32>() <= 2);
        let weights = tensor_weights(&set);
        // sum of weights over a lower set is always 1
        assert_eq!(weights.iter().sum::<i32>(), 1);
        for (t, &w) in set.iter().zip(&weights)
        {
            let expected = match t.iter().sum::<i32>()
            {
                2 => 1,
                1 => -1,
                _ => 0,
            };
            assert_eq!(w, expected, "tensor {t:?}");
        }
        let (active, active_w) = active_tensors(&set, &weights);
        assert_eq!(active.len(), 5);
        assert_eq!(active_w.len(), 5);
    }

    #[test]
    fn weight_annihilation_on_lower_tails()
    {
        // sum of w over any lexicographic tail is 0 iff the complement is lower
        let set = lower_set_from_criterion(3, |t| t.iter().sum::<i32>() <= 3);
        let weights = tensor_weights(&set);
        let total: i32 = weights.iter().sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn limits_and_completion()
    {
        let set = lower_set_from_criterion(2, |t| t.iter().sum::<i32>() <= 3);
        let limited = remove_by_limit(&set, &[1, -1]);
        assert!(limited.iter().all(|t| t[0] <= 1));
        let sparse = MultiIndexSet::from_indexes(2, vec![2, 1]);
        let completed = complete_to_lower(&sparse);
        assert_eq!(completed.len(), 6);
        assert!(completed.contains(&[0, 0]));
        assert!(completed.contains(&[1, 1]));
    }

    #[test]
    fn nested_points_dedup()
    {
        let tensors = lower_set_from_criterion(2, |t| t.iter().sum::<i32>() <= 1);
        // clenshaw-curtis style growth 1, 3, 5...
        let points = generate_nested_points(&tensors, |l| if l == 0 { 1 } else { (1 << l) + 1 });
        // tensors (0,0), (0,1), (1,0): 1 + 3 + 3 points with (0,0) shared twice
        assert_eq!(points.len(), 5);
    }

    #[test]
    fn exclusive_children_respect_parents()
    {
        let tensors = lower_set_from_criterion(2, |t| t.iter().sum::<i32>() <= 1);
        let kids = add_exclusive_children(&tensors, &MultiIndexSet::new(2), &[]);
        // children of the L-shape with all parents present: (2,0), (1,1), (0,2)
        assert_eq!(kids.len(), 3);
        assert!(kids.contains(&[1, 1]));
    }
}
