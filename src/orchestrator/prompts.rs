//! 内置提示词模板（config/prompts 下同名文件可覆盖）
//!
//! 占位符：规划模板 {tool_list} {query} {plan_schema}；
//! 参数模板 {query} {tool_name} {tool_description} {context} {intent_result}。

pub const INTENT_PARSER_FILE: &str = "intent_parser.txt";
pub const PARAMETER_OPTIMIZER_FILE: &str = "parameter_optimizer.txt";

pub const INTENT_PARSER_PROMPT: &str = r#"你是一个任务规划器，负责分析用户需求并规划工具的执行顺序。

可用工具:
{tool_list}

用户输入: {query}

规划步骤：
1. 分析用户需求，拆解为独立任务
2. 选择合适的工具完成任务
3. 确定执行顺序和依赖关系

返回JSON格式：
{
    "tasks": [
        {
            "id": "task_1",
            "tool_name": "工具名称",
            "reason": "为什么需要使用这个工具",
            "order": 1,
            "depends_on": []
        }
    ],
    "execution_mode": "串行",
    "execution_strategy": {
        "parallel_groups": [],
        "reason": "执行策略的原因"
    }
}

输出需符合以下 JSON Schema：
{plan_schema}

注意：
1. 只需要确定工具顺序，不需要设置具体参数
2. 正确设置任务依赖关系
3. 合理规划执行顺序
4. 复杂任务可能需要多个工具配合完成
5. 目前只允许串行执行工具
"#;

pub const PARAMETER_OPTIMIZER_PROMPT: &str = r#"你是参数优化器，为工具配置最优参数。

输入信息:
用户问题: {query}
工具名称: {tool_name}
工具描述:
{tool_description}
历史上下文: {context}
意图分析: {intent_result}

参数设置要求:
1. 严格遵守参数类型限制
2. 必需参数只能使用指定枚举值
3. context参数需从历史上下文提取相关内容
4. 输入问题需综合原始问题和意图分析结果
5. 所有参数需基于工具要求和当前需求优化

示例:
用户问题: "使用搜索工具搜索'特朗普是谁'并总结"
搜索工具问题: "特朗普是谁"
文字工具问题: "结合上下文总结特朗普是谁"

返回格式:
{
    "{tool_name}": {
        "参数名": "参数值"
    },
    "explanation": "参数配置说明"
}
"#;

/// 占位符替换，单遍扫描模板
///
/// 只识别 vars 中出现的 `{name}`；替换进来的值不会再被扫描，其余花括号原样保留。
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let hit = tail.find('}').and_then(|end| {
            let name = &tail[..end];
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| (*v, end))
        });
        match hit {
            Some((value, end)) => {
                out.push_str(value);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_all_occurrences() {
        let out = render(PARAMETER_OPTIMIZER_PROMPT, &[("tool_name", "WeatherTool")]);
        assert!(out.contains("工具名称: WeatherTool"));
        assert!(out.contains("\"WeatherTool\": {"));
        assert!(!out.contains("{tool_name}"));
    }

    #[test]
    fn test_render_does_not_rescan_substituted_values() {
        let out = render(
            "问题: {query}\n上下文: {context}",
            &[("query", "武汉天气"), ("context", "上一步输出 {query} 与 {x}")],
        );
        assert_eq!(out, "问题: 武汉天气\n上下文: 上一步输出 {query} 与 {x}");
    }

    #[test]
    fn test_render_keeps_unknown_braces() {
        assert_eq!(render("{ \"a\": {b} }", &[("b", "1")]), "{ \"a\": 1 }");
        assert_eq!(render("{open", &[("open", "x")]), "{open");
    }
}
