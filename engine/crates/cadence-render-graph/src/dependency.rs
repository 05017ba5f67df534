//! 依赖解析、依赖图构建和拓扑排序
//!
//! 1. 把 Input / IO image 沿 connect 关系解析到拥有物理资源的 Private / Output image
//! 2. 分析 Pass 之间的资源依赖关系，构建 DAG
//! 3. 稳定拓扑排序：没有数据依赖的 Pass 保持声明顺序

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
};

use slotmap::SecondaryMap;

use crate::{
    error::{RenderGraphError, RenderGraphResult},
    graph::GraphDecl,
    image::ImageId,
};

/// 依赖边：从 producer 到 consumer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DependencyEdge {
    /// 生产者 Pass 索引
    pub producer: usize,
    /// 消费者 Pass 索引
    pub consumer: usize,
}

/// 依赖图
///
/// Pass 索引即全局声明顺序，拓扑排序以此作为平局时的次序。
pub struct DependencyGraph {
    /// Pass 数量
    pass_count: usize,
    /// 邻接表（出边）
    adjacency: Vec<Vec<usize>>,
    /// 入度表
    in_degrees: Vec<usize>,
    /// 所有边，按添加顺序
    edges: Vec<DependencyEdge>,
}

impl DependencyGraph {
    pub fn new(pass_count: usize) -> Self {
        Self {
            pass_count,
            adjacency: vec![Vec::new(); pass_count],
            in_degrees: vec![0; pass_count],
            edges: Vec::new(),
        }
    }

    /// 添加依赖边，自环与重复边会被忽略
    pub fn add_edge(&mut self, producer: usize, consumer: usize) {
        if producer == consumer || self.adjacency[producer].contains(&consumer) {
            return;
        }
        self.adjacency[producer].push(consumer);
        self.in_degrees[consumer] += 1;
        self.edges.push(DependencyEdge { producer, consumer });
    }

    /// 稳定拓扑排序（Kahn）
    ///
    /// 每一步都从入度为 0 的 Pass 中取索引最小的一个。
    ///
    /// # 返回
    /// - `Ok(order)`: 拓扑排序后的 Pass 索引列表
    /// - `Err(remaining)`: 检测到循环依赖，返回未能排序的 Pass 索引（升序）
    pub fn topological_sort(&self) -> Result<Vec<usize>, Vec<usize>> {
        let mut in_degrees = self.in_degrees.clone();
        let mut ready: BinaryHeap<Reverse<usize>> =
            (0..self.pass_count).filter(|&i| in_degrees[i] == 0).map(Reverse).collect();
        let mut result = Vec::with_capacity(self.pass_count);

        while let Some(Reverse(node)) = ready.pop() {
            result.push(node);

            for &neighbor in &self.adjacency[node] {
                in_degrees[neighbor] -= 1;
                if in_degrees[neighbor] == 0 {
                    ready.push(Reverse(neighbor));
                }
            }
        }

        if result.len() != self.pass_count {
            let remaining: Vec<usize> = (0..self.pass_count).filter(|&i| in_degrees[i] > 0).collect();
            Err(remaining)
        } else {
            Ok(result)
        }
    }

    /// 获取 Pass 的直接依赖（前驱）
    pub fn get_predecessors(&self, pass_index: usize) -> Vec<usize> {
        self.edges.iter().filter(|edge| edge.consumer == pass_index).map(|edge| edge.producer).collect()
    }

    /// 获取 Pass 的直接后继
    pub fn get_successors(&self, pass_index: usize) -> &[usize] {
        &self.adjacency[pass_index]
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }
}

/// image 引用的解析结果
pub(crate) struct ImageResolution {
    /// Input / IO -> 直接上游
    pub links: HashMap<ImageId, ImageId>,
    /// 每个 image -> 拥有物理资源的 image
    pub owners: SecondaryMap<ImageId, ImageId>,
}

fn unresolved(decl: &GraphDecl, image: ImageId) -> RenderGraphError {
    let node = &decl.images[image];
    RenderGraphError::UnresolvedReference {
        component: decl.components[node.component.0].name.clone(),
        image: node.name.clone(),
    }
}

/// 按名字查找 image，component 或 image 不存在时返回 `UnresolvedReference`
pub(crate) fn lookup_image(decl: &GraphDecl, component: &str, image: &str) -> RenderGraphResult<ImageId> {
    decl.component_lookup
        .get(component)
        .and_then(|id| decl.components[id.0].images.get(image))
        .copied()
        .ok_or_else(|| RenderGraphError::UnresolvedReference {
            component: component.to_string(),
            image: image.to_string(),
        })
}

/// 沿引用链找到拥有物理资源的 image
///
/// 缺少 connect 或引用成环都视为无法解析。
pub(crate) fn resolve_owner(
    decl: &GraphDecl,
    links: &HashMap<ImageId, ImageId>,
    image: ImageId,
) -> RenderGraphResult<ImageId> {
    let mut current = image;
    for _ in 0..=decl.images.len() {
        let node = &decl.images[current];
        if node.kind.is_owner() {
            return Ok(current);
        }
        match links.get(&current) {
            Some(&upstream) => current = upstream,
            None => return Err(unresolved(decl, current)),
        }
    }
    Err(unresolved(decl, image))
}

/// 解析所有 connect 以及每个 image 的物理归属
pub(crate) fn resolve_images(decl: &GraphDecl) -> RenderGraphResult<ImageResolution> {
    let mut links = HashMap::new();

    for connection in &decl.connections {
        let src = lookup_image(decl, &connection.src_component, &connection.src_image)?;
        let dst = lookup_image(decl, &connection.dst_component, &connection.dst_image)?;
        let invalid = |reason: &str| RenderGraphError::InvalidConnection {
            src: format!("{}.{}", connection.src_component, connection.src_image),
            dst: format!("{}.{}", connection.dst_component, connection.dst_image),
            reason: reason.to_string(),
        };

        if !decl.images[src].kind.is_connect_source() {
            return Err(invalid("source is not an Output or IO image"));
        }
        if !decl.images[dst].kind.is_connect_target() {
            return Err(invalid("destination is not an Input or IO image"));
        }
        match links.insert(dst, src) {
            Some(previous) if previous != src => return Err(invalid("destination is already connected")),
            _ => {}
        }
    }

    let mut owners = SecondaryMap::new();
    for image in decl.images.keys() {
        owners.insert(image, resolve_owner(decl, &links, image)?);
    }

    Ok(ImageResolution { links, owners })
}

/// `upstream` 是否在 `image` 的引用链上（不含 `image` 自身）
fn is_upstream_of(decl: &GraphDecl, links: &HashMap<ImageId, ImageId>, upstream: ImageId, image: ImageId) -> bool {
    let mut current = image;
    for _ in 0..decl.images.len() {
        match links.get(&current) {
            Some(&next) if next == upstream => return true,
            Some(&next) => current = next,
            None => return false,
        }
    }
    false
}

/// 根据共享物理 image 的读写关系建立 Pass 之间的依赖边
///
/// 任意两个 Pass 只要使用的 image 解析到同一个 owner，且至少一方写入（RAW / WAR / WAW），就建立边：
/// - component 内部：声明在前的 Pass 指向声明在后的 Pass
/// - component 之间：沿引用链方向，从使用上游 image 的 Pass 指向使用下游 image 的 Pass；
///   两个 image 互不在对方的引用链上时（例如同一个 Output 的两个消费者）按声明顺序
pub(crate) fn build_dependency_graph(decl: &GraphDecl, resolution: &ImageResolution) -> DependencyGraph {
    let mut graph = DependencyGraph::new(decl.passes.len());

    for (first, first_pass) in decl.passes.iter().enumerate() {
        for (second, second_pass) in decl.passes.iter().enumerate().skip(first + 1) {
            let same_component = first_pass.component == second_pass.component;
            for (first_image, first_usage) in &first_pass.usages {
                for (second_image, second_usage) in &second_pass.usages {
                    let hazard = resolution.owners[*first_image] == resolution.owners[*second_image]
                        && (first_usage.is_write() || second_usage.is_write());
                    if !hazard {
                        continue;
                    }
                    if !same_component && is_upstream_of(decl, &resolution.links, *second_image, *first_image) {
                        graph.add_edge(second, first);
                    } else {
                        graph.add_edge(first, second);
                    }
                }
            }
        }
    }

    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_dependency() {
        // Pass 0 -> Pass 1 -> Pass 2
        let mut graph = DependencyGraph::new(3);
        graph.add_edge(1, 2);
        graph.add_edge(0, 1);

        assert_eq!(graph.topological_sort().unwrap(), vec![0, 1, 2]);
        assert_eq!(graph.get_predecessors(2), vec![1]);
        assert_eq!(graph.get_successors(0), &[1]);
    }

    #[test]
    fn test_independent_passes_keep_declaration_order() {
        // Pass 3 依赖 Pass 0，其余没有依赖
        let mut graph = DependencyGraph::new(5);
        graph.add_edge(0, 3);

        assert_eq!(graph.topological_sort().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_edge_against_declaration_order() {
        // Pass 1 必须在 Pass 0 之前，Pass 2 独立
        let mut graph = DependencyGraph::new(3);
        graph.add_edge(1, 0);

        assert_eq!(graph.topological_sort().unwrap(), vec![1, 0, 2]);
    }

    #[test]
    fn test_smallest_ready_pass_first() {
        // Pass 2 -> Pass 0，Pass 2 -> Pass 1；Pass 3 独立
        let mut graph = DependencyGraph::new(4);
        graph.add_edge(2, 1);
        graph.add_edge(2, 0);

        assert_eq!(graph.topological_sort().unwrap(), vec![2, 0, 1, 3]);
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = DependencyGraph::new(4);
        graph.add_edge(0, 1);
        graph.add_edge(1, 2);
        graph.add_edge(2, 1);

        assert_eq!(graph.topological_sort(), Err(vec![1, 2]));
    }

    #[test]
    fn test_self_and_duplicate_edges_ignored() {
        let mut graph = DependencyGraph::new(2);
        graph.add_edge(0, 0);
        graph.add_edge(0, 1);
        graph.add_edge(0, 1);

        assert_eq!(graph.edges().len(), 1);
        assert_eq!(graph.topological_sort().unwrap(), vec![0, 1]);
    }
}
